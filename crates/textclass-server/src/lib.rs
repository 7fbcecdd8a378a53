//! Textclass Server
//!
//! Serves the classifier registry over TCP. Each accepted connection gets
//! its own task that reads one framed command at a time, dispatches it and
//! answers with exactly one framed JSON response.
//!
//! ```text
//! client -> frame -> ConnectionHandler -> ClassifierRegistry -> predict
//!        <- frame <- {"status": ..., "result": ...}
//! ```

pub mod config;
pub mod connection;
pub mod server;

pub use config::{ProtocolConfig, ServerConfig};
pub use connection::ConnectionHandler;
pub use server::{Server, ServerHandle, ServerState};

/// Version reported by the VERSION command
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
