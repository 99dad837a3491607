pub mod collaborators;
pub mod config;
pub mod export;
pub mod models;
pub mod service;

pub use config::AppConfig;
pub use service::{AppState, build_router, create_app};
