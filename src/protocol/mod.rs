//! Rendezvous protocol for swarmrunner.
//!
//! - Single-slot agent mailboxes with blocking hand-off
//! - Protocol value types (environment snapshots, poll outcomes, listings)
//! - The register / poll / send / list handler

pub mod mailbox;
pub mod rendezvous;
pub mod types;

pub use mailbox::Mailbox;
pub use rendezvous::Rendezvous;
pub use types::{AgentSummary, ClientList, Environment, PollOutcome};
