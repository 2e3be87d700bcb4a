//! # Switchyard Runtime
//!
//! Server lifecycle for the gateway:
//! - Pipeline assembly from configuration
//! - Connection handling on hyper's HTTP/1.1 server
//! - Graceful shutdown with signal handling and request draining
//! - Background eviction of idle rate limit windows

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod handler;
pub mod health;
pub mod server;
pub mod shutdown;

pub use handler::GatewayHandler;
pub use health::Health;
pub use server::{Server, ServerBuilder};
pub use shutdown::{ShutdownSignal, SignalHandler};

/// Runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Server is initializing
    Initializing,
    /// Server is running
    Running,
    /// Server is shutting down
    ShuttingDown,
    /// Server is stopped
    Stopped,
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::server::{Server, ServerBuilder};
    pub use crate::shutdown::{ShutdownSignal, SignalHandler};
    pub use crate::RuntimeState;
}
