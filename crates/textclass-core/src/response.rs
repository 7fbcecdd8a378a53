//! JSON response envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Raw payload the server historically answers RELOAD with.
pub const LEGACY_RELOAD_PAYLOAD: &[u8] = b"reload";

/// Outcome of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Error,
}

/// `{"status": "OK"|"ERROR", "result": <value>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub result: Value,
}

impl Response {
    /// Successful response carrying `result`
    pub fn ok(result: impl Into<Value>) -> Self {
        Self {
            status: Status::Ok,
            result: result.into(),
        }
    }

    /// Failed response carrying `result`
    pub fn error(result: impl Into<Value>) -> Self {
        Self {
            status: Status::Error,
            result: result.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Serialize to the bytes sent as one frame
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a response frame.
    ///
    /// The bare `reload` payload is accepted and read as a successful
    /// response whose result is `"reload"`.
    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        if payload == LEGACY_RELOAD_PAYLOAD {
            return Ok(Self::ok("reload"));
        }
        Ok(serde_json::from_slice(payload)?)
    }
}
