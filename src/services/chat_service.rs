//! Chatroom operations: room CRUD, membership, message creation and
//! history retrieval. Fan-out to connected sockets is the hub's job; this
//! layer owns authorization and persistence.

use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, Chatroom, MessageType, MAX_CONTENT_BYTES};
use crate::repository::{ChatStore, HotStore};
use crate::services::user_client::UserDirectory;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct ChatService {
    chat: Arc<dyn ChatStore>,
    hot: Arc<dyn HotStore>,
    users: Arc<dyn UserDirectory>,
    op_timeout: Duration,
}

impl ChatService {
    pub fn new(
        chat: Arc<dyn ChatStore>,
        hot: Arc<dyn HotStore>,
        users: Arc<dyn UserDirectory>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            chat,
            hot,
            users,
            op_timeout,
        }
    }

    async fn deadline<T>(&self, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Unavailable("store deadline exceeded".into())),
        }
    }

    async fn require_user(&self, user_id: &str) -> AppResult<String> {
        self.users
            .get_user(user_id)
            .await?
            .map(|u| u.username)
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
    }

    pub async fn create_chatroom(
        &self,
        creator_id: &str,
        name: &str,
        description: &str,
        is_private: bool,
    ) -> AppResult<Chatroom> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidArgument("chatroom name is required".into()));
        }
        self.require_user(creator_id).await?;

        let room = Chatroom::new(creator_id, name, description, is_private);
        self.deadline(self.chat.put_chatroom(&room)).await?;

        if let Err(e) = self.hot.room_set_add(creator_id, &room.id).await {
            warn!(room_id = %room.id, error = %e, "could not update membership set");
        }
        Ok(room)
    }

    /// Adds the user and appends the join system message. The returned
    /// message is what the hub should fan out to the room.
    pub async fn join_chatroom(&self, room_id: &str, user_id: &str) -> AppResult<ChatMessage> {
        let username = self.require_user(user_id).await?;
        let room = self
            .deadline(self.chat.get_chatroom(room_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chatroom {room_id}")))?;

        if room.has_member(user_id) {
            return Err(AppError::AlreadyExists(format!(
                "user {user_id} is already a member"
            )));
        }

        self.deadline(self.chat.add_member(room_id, user_id)).await?;
        if let Err(e) = self.hot.room_set_add(user_id, room_id).await {
            warn!(%room_id, error = %e, "could not update membership set");
        }

        let system = ChatMessage::system(room_id, &format!("{username} joined the chatroom"));
        self.persist_system_message(&system).await;
        Ok(system)
    }

    pub async fn leave_chatroom(&self, room_id: &str, user_id: &str) -> AppResult<ChatMessage> {
        let username = self.require_user(user_id).await?;
        let room = self
            .deadline(self.chat.get_chatroom(room_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chatroom {room_id}")))?;

        if !room.has_member(user_id) {
            return Err(AppError::NotFound(format!(
                "user {user_id} is not a member of chatroom {room_id}"
            )));
        }
        // The creator stays while anyone else is in the room.
        if room.creator_id == user_id && room.member_ids.len() > 1 {
            return Err(AppError::FailedPrecondition(
                "creator cannot leave a room that still has members".into(),
            ));
        }

        self.deadline(self.chat.remove_member(room_id, user_id)).await?;
        if let Err(e) = self.hot.room_set_remove(user_id, room_id).await {
            warn!(%room_id, error = %e, "could not update membership set");
        }

        let system = ChatMessage::system(room_id, &format!("{username} left the chatroom"));
        self.persist_system_message(&system).await;
        Ok(system)
    }

    async fn persist_system_message(&self, message: &ChatMessage) {
        if let Err(e) = self.chat.put_message(message).await {
            warn!(room_id = %message.chatroom_id, error = %e, "could not persist system message");
        }
        if let Err(e) = self.hot.cache_message(message).await {
            warn!(room_id = %message.chatroom_id, error = %e, "could not cache system message");
        }
    }

    pub async fn send_message(
        &self,
        room_id: &str,
        user_id: &str,
        content: &str,
        message_type: MessageType,
    ) -> AppResult<ChatMessage> {
        if message_type != MessageType::System && content.is_empty() {
            return Err(AppError::InvalidArgument("message content is empty".into()));
        }
        if content.len() > MAX_CONTENT_BYTES {
            return Err(AppError::InvalidArgument(format!(
                "message content exceeds {MAX_CONTENT_BYTES} bytes"
            )));
        }

        let username = self.require_user(user_id).await?;
        if !self.deadline(self.chat.is_member(room_id, user_id)).await? {
            return Err(AppError::PermissionDenied(format!(
                "user {user_id} is not a member of chatroom {room_id}"
            )));
        }

        let message = ChatMessage::new(room_id, user_id, &username, content, message_type);
        self.deadline(self.chat.put_message(&message)).await?;
        if let Err(e) = self.hot.cache_message(&message).await {
            warn!(%room_id, error = %e, "could not cache message");
        }
        Ok(message)
    }

    /// History in chronological ascending order. Cursorless reads come from
    /// the hot cache when it has anything; cursor reads always hit the
    /// durable log.
    pub async fn get_messages(
        &self,
        room_id: &str,
        user_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> AppResult<(Vec<ChatMessage>, Option<String>)> {
        if !self.deadline(self.chat.is_member(room_id, user_id)).await? {
            return Err(AppError::PermissionDenied(format!(
                "user {user_id} is not a member of chatroom {room_id}"
            )));
        }
        let limit = limit.clamp(1, 200);

        if cursor.is_none() {
            match self.hot.cache_recent(room_id, limit).await {
                Ok(recent) if !recent.is_empty() => {
                    let mut ascending = recent;
                    ascending.reverse();
                    return Ok((ascending, None));
                }
                Ok(_) => {}
                Err(e) => warn!(%room_id, error = %e, "message cache read failed, using durable log"),
            }
        }

        self.deadline(self.chat.list_messages(room_id, limit, cursor))
            .await
    }

    pub async fn get_chatrooms(&self, user_id: &str) -> AppResult<Vec<Chatroom>> {
        self.require_user(user_id).await?;
        self.deadline(self.chat.list_rooms_for_user(user_id)).await
    }

    pub async fn is_member(&self, room_id: &str, user_id: &str) -> AppResult<bool> {
        self.deadline(self.chat.is_member(room_id, user_id)).await
    }
}
