//! Call/reply envelope handling on both sides of a connection.

pub mod client;
pub mod processor;

pub use client::RpcClient;
pub use processor::{run_connection, write_exception, write_reply, Processor};
