pub mod config;
pub mod error;
pub mod grpc;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;
