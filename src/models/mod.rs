pub mod chatroom;
pub mod message;
pub mod session;
pub mod stream;

pub use chatroom::Chatroom;
pub use message::{ChatMessage, MessageType};
pub use message::{MAX_CONTENT_BYTES, SYSTEM_USERNAME, SYSTEM_USER_ID};
pub use session::{StreamPermissions, StreamSession, SESSION_TTL};
pub use stream::{Stream, StreamStatus};
