//! Triage Server
//!
//! HTTP boundary over [`triage_service::TriageService`]: request parsing,
//! status mapping, configuration and process startup helpers.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use cli::{Cli, LogFormat};
pub use config::ServerConfig;
pub use routes::create_router;
pub use state::AppState;
