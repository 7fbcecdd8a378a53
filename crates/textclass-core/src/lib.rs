//! Textclass Core
//!
//! Wire-level building blocks shared by the textclass server and client.
//!
//! This crate provides:
//! - The error type and result alias used across the workspace
//! - The length-prefixed frame codec and the framed channel built on it
//! - Command parsing for the colon-delimited request lines
//! - The JSON response envelope

pub mod channel;
pub mod command;
pub mod error;
pub mod frame;
pub mod response;

pub use channel::FramedChannel;
pub use command::Command;
pub use error::{Error, Result};
pub use frame::{Frame, FrameCodec, HEADER_SIZE, MAX_FRAME_SIZE};
pub use response::{Response, Status, LEGACY_RELOAD_PAYLOAD};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::channel::FramedChannel;
    pub use crate::command::Command;
    pub use crate::error::{Error, Result};
    pub use crate::frame::{Frame, MAX_FRAME_SIZE};
    pub use crate::response::{Response, Status};
}
