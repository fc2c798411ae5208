use crate::grpc::middleware::RequestGuard;
use crate::grpc::proto::chat::chat_service_server::ChatService;
use crate::grpc::proto::chat::*;
use crate::grpc::{
    chatroom_to_proto, error_status, message_to_proto, message_type_from_proto, ok_status,
};
use crate::state::AppState;
use crate::websocket::message_types::WsEnvelope;
use tonic::{Request, Response, Status};

const SERVICE: &str = "ChatService";

#[derive(Clone)]
pub struct ChatServiceImpl {
    state: AppState,
}

impl ChatServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl ChatService for ChatServiceImpl {
    async fn create_chatroom(
        &self,
        request: Request<CreateChatroomRequest>,
    ) -> Result<Response<CreateChatroomResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "CreateChatroom");
        let req = request.into_inner();

        let response = match self
            .state
            .chat
            .create_chatroom(&req.creator_id, &req.name, &req.description, req.is_private)
            .await
        {
            Ok(room) => {
                guard.complete(tonic::Code::Ok);
                CreateChatroomResponse {
                    status: Some(ok_status("Chatroom created successfully")),
                    chatroom: Some(chatroom_to_proto(&room)),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                CreateChatroomResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn join_chatroom(
        &self,
        request: Request<JoinChatroomRequest>,
    ) -> Result<Response<JoinChatroomResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "JoinChatroom");
        let req = request.into_inner();

        let response = match self.state.chat.join_chatroom(&req.chatroom_id, &req.user_id).await {
            Ok(system_message) => {
                guard.complete(tonic::Code::Ok);
                // Members already connected see the join announcement live.
                self.state
                    .hub
                    .broadcast_room(&req.chatroom_id, &WsEnvelope::message(&system_message).to_json())
                    .await;
                JoinChatroomResponse {
                    status: Some(ok_status("Successfully joined chatroom")),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                JoinChatroomResponse {
                    status: Some(error_status(&err)),
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn leave_chatroom(
        &self,
        request: Request<LeaveChatroomRequest>,
    ) -> Result<Response<LeaveChatroomResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "LeaveChatroom");
        let req = request.into_inner();

        let response = match self.state.chat.leave_chatroom(&req.chatroom_id, &req.user_id).await {
            Ok(system_message) => {
                guard.complete(tonic::Code::Ok);
                self.state
                    .hub
                    .broadcast_room(&req.chatroom_id, &WsEnvelope::message(&system_message).to_json())
                    .await;
                LeaveChatroomResponse {
                    status: Some(ok_status("Successfully left chatroom")),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                LeaveChatroomResponse {
                    status: Some(error_status(&err)),
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn send_message(
        &self,
        request: Request<SendMessageRequest>,
    ) -> Result<Response<SendMessageResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "SendMessage");
        let req = request.into_inner();

        let message_type = MessageType::try_from(req.r#type)
            .map(message_type_from_proto)
            .unwrap_or(crate::models::MessageType::Text);

        let response = match self
            .state
            .chat
            .send_message(&req.chatroom_id, &req.user_id, &req.content, message_type)
            .await
        {
            Ok(message) => {
                guard.complete(tonic::Code::Ok);
                self.state
                    .hub
                    .broadcast_room(&req.chatroom_id, &WsEnvelope::message(&message).to_json())
                    .await;
                SendMessageResponse {
                    status: Some(ok_status("Message sent successfully")),
                    message: Some(message_to_proto(&message)),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                SendMessageResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn get_messages(
        &self,
        request: Request<GetMessagesRequest>,
    ) -> Result<Response<GetMessagesResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "GetMessages");
        let req = request.into_inner();

        let cursor = (!req.cursor.is_empty()).then_some(req.cursor.as_str());
        let limit = if req.limit > 0 { req.limit as usize } else { 50 };

        let response = match self
            .state
            .chat
            .get_messages(&req.chatroom_id, &req.user_id, limit, cursor)
            .await
        {
            Ok((messages, next_cursor)) => {
                guard.complete(tonic::Code::Ok);
                GetMessagesResponse {
                    status: Some(ok_status("Messages retrieved successfully")),
                    messages: messages.iter().map(message_to_proto).collect(),
                    next_cursor: next_cursor.unwrap_or_default(),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                GetMessagesResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn get_chatrooms(
        &self,
        request: Request<GetChatroomsRequest>,
    ) -> Result<Response<GetChatroomsResponse>, Status> {
        let guard = RequestGuard::new(SERVICE, "GetChatrooms");
        let req = request.into_inner();

        let response = match self.state.chat.get_chatrooms(&req.user_id).await {
            Ok(rooms) => {
                guard.complete(tonic::Code::Ok);
                GetChatroomsResponse {
                    status: Some(ok_status("Chatrooms retrieved successfully")),
                    chatrooms: rooms.iter().map(chatroom_to_proto).collect(),
                }
            }
            Err(err) => {
                guard.complete(err.grpc_code());
                GetChatroomsResponse {
                    status: Some(error_status(&err)),
                    ..Default::default()
                }
            }
        };
        Ok(Response::new(response))
    }
}
