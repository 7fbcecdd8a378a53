//! Request commands.
//!
//! A command is one line of UTF-8 text carried in a single frame:
//! `VERB[:ARG1[:ARG2]]`, with trailing whitespace ignored.

use std::fmt;

use crate::error::{Error, Result};

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness check
    Ping,
    /// Report the server version
    Version,
    /// Re-apply the configuration file
    Reload,
    /// Snapshot of classifier name to enabled flag
    ListClassifier,
    /// Enable or disable one classifier
    SetClassifier { name: String, value: String },
    /// MD5 of a server-local file
    Md5File { path: String },
    /// MD5 of a streamed payload
    Md5Stream,
    /// Predict over a streamed payload
    PredictStream,
    /// Predict over a server-local file
    PredictFile { path: String },
    /// End the session
    Close,
    /// Anything else; carries the verb as received
    Unknown(String),
}

impl Command {
    pub const PING: &'static str = "PING";
    pub const VERSION: &'static str = "VERSION";
    pub const RELOAD: &'static str = "RELOAD";
    pub const LIST_CLASSIFIER: &'static str = "LIST_CLASSIFIER";
    pub const SET_CLASSIFIER: &'static str = "SET_CLASSIFIER";
    pub const MD5_FILE: &'static str = "MD5_FILE";
    pub const MD5_STREAM: &'static str = "MD5_STREAM";
    pub const PREDICT_STREAM: &'static str = "PREDICT_STREAM";
    pub const PREDICT_FILE: &'static str = "PREDICT_FILE";
    pub const CLOSE: &'static str = "CLOSE";

    /// Parse a raw frame payload into a command.
    ///
    /// Invalid UTF-8 is replaced rather than rejected so that an unreadable
    /// verb still ends up as `Unknown`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Protocol` when a known verb is missing a required
    /// argument.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(payload);
        let line = text.trim_end();

        let (verb, rest) = match line.split_once(':') {
            Some((verb, rest)) => (verb, Some(rest)),
            None => (line, None),
        };

        let command = match verb {
            Self::PING => Self::Ping,
            Self::VERSION => Self::Version,
            Self::RELOAD => Self::Reload,
            Self::LIST_CLASSIFIER => Self::ListClassifier,
            Self::SET_CLASSIFIER => {
                let rest = rest.ok_or_else(missing_argument)?;
                let mut args = rest.split(':');
                let name = args.next().unwrap_or_default();
                let value = args.next().ok_or_else(missing_argument)?;
                Self::SetClassifier {
                    name: name.to_string(),
                    value: value.to_string(),
                }
            }
            Self::MD5_FILE => Self::Md5File {
                path: path_argument(rest)?,
            },
            Self::MD5_STREAM => Self::Md5Stream,
            Self::PREDICT_STREAM => Self::PredictStream,
            Self::PREDICT_FILE => Self::PredictFile {
                path: path_argument(rest)?,
            },
            Self::CLOSE => Self::Close,
            other => Self::Unknown(other.to_string()),
        };

        Ok(command)
    }

    /// The wire verb of this command.
    pub fn verb(&self) -> &str {
        match self {
            Self::Ping => Self::PING,
            Self::Version => Self::VERSION,
            Self::Reload => Self::RELOAD,
            Self::ListClassifier => Self::LIST_CLASSIFIER,
            Self::SetClassifier { .. } => Self::SET_CLASSIFIER,
            Self::Md5File { .. } => Self::MD5_FILE,
            Self::Md5Stream => Self::MD5_STREAM,
            Self::PredictStream => Self::PREDICT_STREAM,
            Self::PredictFile { .. } => Self::PREDICT_FILE,
            Self::Close => Self::CLOSE,
            Self::Unknown(verb) => verb,
        }
    }

    /// Whether the command consumes frames up to a sentinel before answering.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Md5Stream | Self::PredictStream)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetClassifier { name, value } => {
                write!(f, "{}:{}:{}", Self::SET_CLASSIFIER, name, value)
            }
            Self::Md5File { path } => write!(f, "{}:{}", Self::MD5_FILE, path),
            Self::PredictFile { path } => write!(f, "{}:{}", Self::PREDICT_FILE, path),
            other => f.write_str(other.verb()),
        }
    }
}

fn missing_argument() -> Error {
    Error::protocol("Missing argument")
}

fn path_argument(rest: Option<&str>) -> Result<String> {
    match rest {
        Some(path) if !path.is_empty() => Ok(path.to_string()),
        _ => Err(missing_argument()),
    }
}
