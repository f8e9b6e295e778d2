pub mod config;
pub mod handlers;
pub mod service;

pub use config::ServiceConfig;
pub use service::{AppState, build_state, create_app, create_router};
