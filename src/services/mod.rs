pub mod chat_service;
pub mod events;
pub mod reaper;
pub mod recordings;
pub mod stream_service;
pub mod user_client;

pub use chat_service::ChatService;
pub use events::EventSink;
pub use reaper::Reaper;
pub use recordings::RecordingStore;
pub use stream_service::{StreamService, StreamUpdate};
pub use user_client::{KeyValidation, UserDirectory, UserProfile, UserServiceClient};
