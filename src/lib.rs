//! swarmrunner library root.

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod web;

pub use cli::Commands;
pub use config::{ClientConfig, ServerConfig};
pub use crate::core::{AgentRecord, Registry};
pub use error::{Error, Result};
pub use protocol::{Mailbox, PollOutcome, Rendezvous};
pub use web::run_server;
