pub mod client;
pub mod server;

pub use client::*;
pub use server::*;

pub const VOCAL_PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");
