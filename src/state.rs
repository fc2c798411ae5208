use crate::config::Config;
use crate::repository::HotStore;
use crate::services::{ChatService, StreamService, UserDirectory};
use crate::websocket::Hub;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub streams: Arc<StreamService>,
    pub chat: Arc<ChatService>,
    pub hub: Hub,
    pub users: Arc<dyn UserDirectory>,
    pub hot: Arc<dyn HotStore>,
    /// Flips to true when shutdown begins; new upgrades are refused.
    pub shutdown: watch::Receiver<bool>,
}
