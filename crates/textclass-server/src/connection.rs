//! Per-connection command dispatch
//!
//! A handler owns one framed channel and answers one command at a time.
//! Channel failures (transport errors, timeouts, an oversized header) end
//! the connection without a reply. Everything a command does beyond the
//! channel, such as reading a file or running a classifier, is reported
//! back as an `ERROR` response and the connection stays open.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use md5::{Digest, Md5};
use serde_json::{Map, Value};
use textclass_core::{
    Command, Error, FramedChannel, Response, Result, LEGACY_RELOAD_PAYLOAD,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::server::ServerState;
use crate::VERSION;

const FILE_READ_CHUNK: usize = 64 * 1024;

enum Flow {
    Continue,
    Close,
}

/// Serves the commands of one client connection
pub struct ConnectionHandler<S> {
    id: u64,
    peer: SocketAddr,
    channel: FramedChannel<S>,
    state: Arc<ServerState>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(id: u64, peer: SocketAddr, stream: S, state: Arc<ServerState>) -> Self {
        let channel = FramedChannel::with_max_frame_size(stream, state.protocol.max_frame_size);
        Self {
            id,
            peer,
            channel,
            state,
        }
    }

    /// Serve commands until the peer leaves, sends CLOSE or the channel fails
    pub async fn run(mut self) {
        info!(conn = self.id, peer = %self.peer, "Connection opened");

        match self.serve().await {
            Ok(reason) => info!(conn = self.id, peer = %self.peer, "Connection closed: {}", reason),
            Err(e) => {
                metrics::counter!("textclass_errors_total", "kind" => e.kind()).increment(1);
                warn!(conn = self.id, peer = %self.peer, "Connection dropped: {}", e);
            }
        }
    }

    async fn serve(&mut self) -> Result<&'static str> {
        loop {
            let Some(payload) = self.receive().await? else {
                return Ok("peer went away");
            };

            let command = match Command::parse(&payload) {
                Ok(command) => command,
                Err(e) => {
                    debug!(conn = self.id, "Rejected command: {}", e);
                    self.respond(&Response::error(describe(&e))).await?;
                    continue;
                }
            };

            let verb = match &command {
                Command::Unknown(_) => "UNKNOWN".to_string(),
                known => known.verb().to_string(),
            };
            metrics::counter!("textclass_commands_total", "verb" => verb).increment(1);
            debug!(
                conn = self.id,
                streaming = command.is_streaming(),
                "Received command {}",
                command
            );

            if let Flow::Close = self.dispatch(command).await? {
                return Ok("client sent CLOSE");
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow> {
        let response = match command {
            Command::Ping => Response::ok("PONG"),
            Command::Version => Response::ok(VERSION),
            Command::Reload => {
                self.reload().await?;
                return Ok(Flow::Continue);
            }
            Command::ListClassifier => Response::ok(Value::Object(self.state.registry.list_json())),
            Command::SetClassifier { name, value } => self.set_classifier(&name, &value),
            Command::Md5File { path } => self.md5_file(&path).await,
            Command::Md5Stream => self.md5_stream().await?,
            Command::PredictStream => self.predict_stream().await?,
            Command::PredictFile { path } => self.predict_file(&path).await,
            Command::Close => {
                self.respond(&Response::ok("Bye")).await?;
                return Ok(Flow::Close);
            }
            Command::Unknown(verb) => {
                debug!(conn = self.id, "Unknown command '{}'", verb);
                Response::error("Unknown Command")
            }
        };

        self.respond(&response).await?;
        Ok(Flow::Continue)
    }

    fn set_classifier(&self, name: &str, value: &str) -> Response {
        let registry = &self.state.registry;
        match registry.set_enabled(name, value) {
            Ok(flag) => Response::ok(flag_result(name, flag)),
            Err(Error::InvalidValue(reason)) => {
                debug!(conn = self.id, "Rejected flag for '{}': {}", name, reason);
                let current = registry.is_enabled(name).unwrap_or_default();
                Response::error(flag_result(name, current))
            }
            Err(e) => Response::error(describe(&e)),
        }
    }

    async fn reload(&mut self) -> Result<()> {
        let response = match &self.state.config_path {
            Some(path) => match ServerConfig::load(path).await {
                Ok(config) => {
                    let updated = self.state.registry.apply_enabled(
                        config
                            .classifiers
                            .entries
                            .iter()
                            .map(|(name, settings)| (name.as_str(), settings.enabled)),
                    );
                    info!("Reloaded {} classifier flags from {}", updated, path.display());
                    Response::ok("reload")
                }
                Err(e) => {
                    warn!("Reload of {} failed: {}", path.display(), e);
                    Response::error(describe(&e))
                }
            },
            None => {
                debug!("No configuration file to reload");
                Response::ok("reload")
            }
        };

        if response.is_ok() && self.state.protocol.legacy_reload_response {
            self.send(LEGACY_RELOAD_PAYLOAD).await
        } else {
            self.respond(&response).await
        }
    }

    async fn md5_file(&self, raw_path: &str) -> Response {
        let digest = async {
            let path = self.resolve_path(raw_path).await?;
            let mut file = tokio::fs::File::open(&path).await?;
            let mut hasher = Md5::new();
            let mut buf = vec![0u8; FILE_READ_CHUNK];
            loop {
                let read = file.read(&mut buf).await?;
                if read == 0 {
                    break;
                }
                hasher.update(&buf[..read]);
            }
            Ok::<_, Error>(format!("{:x}", hasher.finalize()))
        };

        match digest.await {
            Ok(hex) => Response::ok(hex),
            Err(e) => Response::error(describe(&e)),
        }
    }

    async fn md5_stream(&mut self) -> Result<Response> {
        let mut hasher = Md5::new();
        let mut total = 0usize;

        while let Some(chunk) = self.receive().await? {
            total += chunk.len();
            hasher.update(&chunk);
        }
        self.note_premature_close();

        debug!(conn = self.id, "Hashed {} streamed bytes", total);
        Ok(Response::ok(format!("{:x}", hasher.finalize())))
    }

    async fn predict_stream(&mut self) -> Result<Response> {
        let limit = self.state.protocol.max_stream_size;
        let mut buffer: Vec<u8> = Vec::new();
        let mut overflowed = false;

        while let Some(chunk) = self.receive().await? {
            if overflowed {
                continue;
            }
            if buffer.len() + chunk.len() > limit {
                warn!(conn = self.id, limit, "Streamed payload too large, draining");
                overflowed = true;
                buffer = Vec::new();
                continue;
            }
            buffer.extend_from_slice(&chunk);
        }
        self.note_premature_close();

        if overflowed {
            return Ok(Response::error("Stream too large"));
        }

        let text = match String::from_utf8(buffer) {
            Ok(text) => text,
            Err(e) => return Ok(Response::error(format!("Invalid UTF-8 in stream: {}", e))),
        };
        Ok(self.predict(&text).await)
    }

    async fn predict_file(&self, raw_path: &str) -> Response {
        let text = async {
            let path = self.resolve_path(raw_path).await?;
            let bytes = tokio::fs::read(&path).await?;
            let text = String::from_utf8(bytes).map_err(|e| {
                Error::protocol(format!("Invalid UTF-8 in {}: {}", path.display(), e))
            })?;
            Ok::<_, Error>(text)
        };

        match text.await {
            Ok(text) => self.predict(&text).await,
            Err(e) => Response::error(describe(&e)),
        }
    }

    async fn predict(&self, text: &str) -> Response {
        let lines: Vec<String> = text.split('\n').map(str::to_string).collect();

        match self.state.registry.predict_all_json(&lines).await {
            Ok(map) => Response::ok(Value::Object(map)),
            Err(e) => {
                warn!(conn = self.id, "Prediction failed: {}", e);
                metrics::counter!("textclass_errors_total", "kind" => e.kind()).increment(1);
                Response::error(describe(&e))
            }
        }
    }

    /// Resolve a client-supplied path, confining it to `file_root` when set
    async fn resolve_path(&self, raw: &str) -> Result<PathBuf> {
        let path = PathBuf::from(raw);
        let Some(root) = &self.state.protocol.file_root else {
            return Ok(path);
        };

        let root = tokio::fs::canonicalize(root).await?;
        let candidate = if path.is_absolute() { path } else { root.join(path) };
        let resolved = tokio::fs::canonicalize(&candidate).await?;

        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            Err(Error::protocol(format!("Path outside of file root: {}", raw)))
        }
    }

    fn note_premature_close(&self) {
        if self.channel.is_closed() {
            debug!(conn = self.id, "Stream ended without a sentinel");
        }
    }

    async fn receive(&mut self) -> Result<Option<Bytes>> {
        match self.state.protocol.read_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.channel.receive())
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.channel.receive().await,
        }
    }

    async fn respond(&mut self, response: &Response) -> Result<()> {
        let mut payload = response.to_bytes()?;

        let max = self.channel.max_frame_size();
        if payload.len() > max {
            warn!(conn = self.id, len = payload.len(), max, "Response does not fit in one frame");
            payload = Response::error(format!(
                "Response too large: {} bytes exceeds the frame limit of {}",
                payload.len(),
                max
            ))
            .to_bytes()?;
        }

        self.send(&payload).await
    }

    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        match self.state.protocol.write_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.channel.send(payload))
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.channel.send(payload).await,
        }
    }
}

/// `[{name: flag}]`, the result shape of SET_CLASSIFIER
fn flag_result(name: &str, flag: bool) -> Value {
    let mut entry = Map::new();
    entry.insert(name.to_string(), Value::Bool(flag));
    Value::Array(vec![Value::Object(entry)])
}

/// Message sent back to the client for a failed command
fn describe(err: &Error) -> String {
    match err {
        Error::Protocol(msg) | Error::Classifier(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use serde_json::json;
    use std::collections::BTreeMap;
    use textclass_classifiers::{ClassifierRegistry, KeywordClassifier};
    use tokio::io::{duplex, DuplexStream};

    fn registry() -> Arc<ClassifierRegistry> {
        let mut keywords = BTreeMap::new();
        keywords.insert("sports".to_string(), vec!["goal".to_string()]);
        let keyword = KeywordClassifier::new("keyword", &keywords).unwrap();

        Arc::new(
            ClassifierRegistry::new()
                .with("keyword", Arc::new(keyword), true)
                .unwrap(),
        )
    }

    fn spawn_handler(protocol: ProtocolConfig) -> FramedChannel<DuplexStream> {
        let (client, server) = duplex(64 * 1024);
        let state = Arc::new(ServerState {
            registry: registry(),
            protocol,
            config_path: None,
        });
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        tokio::spawn(ConnectionHandler::new(1, peer, server, state).run());
        FramedChannel::new(client)
    }

    async fn roundtrip(channel: &mut FramedChannel<DuplexStream>, command: &str) -> Response {
        channel.send(command.as_bytes()).await.unwrap();
        let payload = channel.receive().await.unwrap().unwrap();
        Response::from_bytes(&payload).unwrap()
    }

    #[tokio::test]
    async fn test_ping_and_unknown() {
        let mut channel = spawn_handler(ProtocolConfig::default());

        assert_eq!(roundtrip(&mut channel, "PING\n").await, Response::ok("PONG"));
        assert_eq!(
            roundtrip(&mut channel, "FOO\n").await,
            Response::error("Unknown Command")
        );
        assert_eq!(roundtrip(&mut channel, "PING").await, Response::ok("PONG"));
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let mut channel = spawn_handler(ProtocolConfig::default());

        assert_eq!(
            roundtrip(&mut channel, "MD5_FILE\n").await,
            Response::error("Missing argument")
        );
        assert_eq!(
            roundtrip(&mut channel, "SET_CLASSIFIER:keyword\n").await,
            Response::error("Missing argument")
        );
    }

    #[tokio::test]
    async fn test_set_classifier_replies() {
        let mut channel = spawn_handler(ProtocolConfig::default());

        assert_eq!(
            roundtrip(&mut channel, "SET_CLASSIFIER:keyword:False\n").await,
            Response::ok(json!([{"keyword": false}]))
        );
        assert_eq!(
            roundtrip(&mut channel, "SET_CLASSIFIER:keyword:maybe\n").await,
            Response::error(json!([{"keyword": false}]))
        );
        assert_eq!(
            roundtrip(&mut channel, "SET_CLASSIFIER:bayes:true\n").await,
            Response::error("Unknown classifier: bayes")
        );
    }

    #[tokio::test]
    async fn test_predict_stream_limit_drains_to_sentinel() {
        let protocol = ProtocolConfig {
            max_stream_size: 8,
            ..ProtocolConfig::default()
        };
        let mut channel = spawn_handler(protocol);

        channel.send(b"PREDICT_STREAM\n").await.unwrap();
        channel.send(b"goal goal").await.unwrap();
        channel.send(b"more text").await.unwrap();
        channel.send(b"").await.unwrap();
        let payload = channel.receive().await.unwrap().unwrap();
        assert_eq!(
            Response::from_bytes(&payload).unwrap(),
            Response::error("Stream too large")
        );

        assert_eq!(roundtrip(&mut channel, "PING\n").await, Response::ok("PONG"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_stream() {
        let mut channel = spawn_handler(ProtocolConfig::default());

        channel.send(b"PREDICT_STREAM\n").await.unwrap();
        channel.send(&[0xff, 0xfe]).await.unwrap();
        channel.send(b"").await.unwrap();
        let payload = channel.receive().await.unwrap().unwrap();
        assert!(!Response::from_bytes(&payload).unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_file_root_confinement() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("inside.txt"), "abc").unwrap();
        let outside = tempfile::NamedTempFile::new().unwrap();

        let protocol = ProtocolConfig {
            file_root: Some(root.path().to_path_buf()),
            ..ProtocolConfig::default()
        };
        let mut channel = spawn_handler(protocol);

        assert_eq!(
            roundtrip(&mut channel, "MD5_FILE:inside.txt\n").await,
            Response::ok("900150983cd24fb0d6963f7d28e17f72")
        );

        let response = roundtrip(
            &mut channel,
            &format!("MD5_FILE:{}\n", outside.path().display()),
        )
        .await;
        assert!(!response.is_ok());
        assert!(response.result.as_str().unwrap().contains("outside of file root"));
    }

    #[tokio::test]
    async fn test_relative_escape_from_file_root() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("data");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("news.txt"), "goal").unwrap();
        std::fs::write(parent.path().join("secret.txt"), "abc").unwrap();

        let protocol = ProtocolConfig {
            file_root: Some(root),
            ..ProtocolConfig::default()
        };
        let mut channel = spawn_handler(protocol);

        let response = roundtrip(&mut channel, "PREDICT_FILE:news.txt\n").await;
        assert!(response.is_ok());
        assert_eq!(response.result["keyword"][0]["label"], "sports");

        let response = roundtrip(&mut channel, "MD5_FILE:../secret.txt\n").await;
        assert!(response.result.as_str().unwrap().contains("outside of file root"));

        let response = roundtrip(&mut channel, "PREDICT_FILE:missing.txt\n").await;
        assert!(!response.is_ok());
        assert_eq!(roundtrip(&mut channel, "PING\n").await, Response::ok("PONG"));
    }

    #[tokio::test]
    async fn test_reload_of_missing_file_is_an_error_response() {
        let dir = tempfile::tempdir().unwrap();
        let (client, server) = duplex(64 * 1024);
        let state = Arc::new(ServerState {
            registry: registry(),
            protocol: ProtocolConfig::default(),
            config_path: Some(dir.path().join("gone.yaml")),
        });
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        tokio::spawn(ConnectionHandler::new(1, peer, server, state).run());
        let mut channel = FramedChannel::new(client);

        let response = roundtrip(&mut channel, "RELOAD\n").await;
        assert!(!response.is_ok());
        assert!(response.result.as_str().unwrap().contains("gone.yaml"));
        assert_eq!(roundtrip(&mut channel, "PING\n").await, Response::ok("PONG"));
    }

    #[tokio::test]
    async fn test_legacy_reload_payload() {
        let protocol = ProtocolConfig {
            legacy_reload_response: true,
            ..ProtocolConfig::default()
        };
        let mut channel = spawn_handler(protocol);

        channel.send(b"RELOAD\n").await.unwrap();
        let payload = channel.receive().await.unwrap().unwrap();
        assert_eq!(&payload[..], LEGACY_RELOAD_PAYLOAD);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_drops_connection() {
        let protocol = ProtocolConfig {
            read_timeout: Some(5),
            ..ProtocolConfig::default()
        };
        let mut channel = spawn_handler(protocol);

        assert_eq!(roundtrip(&mut channel, "PING\n").await, Response::ok("PONG"));

        // Nothing more is sent; the handler gives up and closes its end.
        assert!(channel.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_response_becomes_error() {
        let protocol = ProtocolConfig {
            max_frame_size: 128,
            ..ProtocolConfig::default()
        };
        let mut channel = spawn_handler(protocol);

        channel.send(b"PREDICT_STREAM\n").await.unwrap();
        channel.send(b"goal\ngoal\ngoal\ngoal\ngoal\ngoal").await.unwrap();
        channel.send(b"").await.unwrap();
        let payload = channel.receive().await.unwrap().unwrap();
        let response = Response::from_bytes(&payload).unwrap();
        assert!(!response.is_ok());
        assert!(response.result.as_str().unwrap().starts_with("Response too large"));
    }

    #[test]
    fn test_describe_strips_prefix() {
        assert_eq!(describe(&Error::protocol("Missing argument")), "Missing argument");
        assert_eq!(
            describe(&Error::UnknownClassifier("x".into())),
            "Unknown classifier: x"
        );
    }
}
