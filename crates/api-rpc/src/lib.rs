//! JSON-RPC API Layer
//!
//! Control surface of the Scrapeflow daemon: enqueue, inspect and cancel
//! executions, tail their logs, read queue statistics and adjust the
//! concurrency cap. Bound to localhost only.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
