//! Core server state: the agent registry and its liveness timers.

pub mod liveness;
pub mod registry;

pub use liveness::LivenessTimer;
pub use registry::{AgentRecord, Registry};
