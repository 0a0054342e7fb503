//! IPC module for bridge-daemon communication

mod protocol;
mod server;

pub use server::Server;
