// Library crate: main.rs and the integration tests both build on it.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod github;
pub mod llm;
pub mod log_capture;
pub mod routes;
pub mod server;
pub mod settings;
pub mod state;
