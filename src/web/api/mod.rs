//! API endpoints module.

pub mod clients;

pub use clients::{list_clients, listen, register_client, remove_client, send_command};
