//! Protocol client

use textclass_core::{Command, Error, Frame, FramedChannel, Response, Result};
use tokio::net::TcpStream;
use tracing::debug;

/// Size of the frames streamed payloads are cut into
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Connection to a textclass server
pub struct Client {
    channel: FramedChannel<TcpStream>,
    chunk_size: usize,
}

impl Client {
    /// Connect to `address:port`. The client never reconnects; a failed
    /// connection attempt is returned to the caller.
    pub async fn connect(address: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((address, port)).await?;
        stream.set_nodelay(true)?;
        debug!("Connected to {}:{}", address, port);

        Ok(Self {
            channel: FramedChannel::new(stream),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Accept response frames up to `max_frame_size` bytes
    pub fn with_max_frame_size(self, max_frame_size: usize) -> Self {
        let stream = self.channel.into_inner();
        Self {
            channel: FramedChannel::with_max_frame_size(stream, max_frame_size),
            chunk_size: self.chunk_size.min(max_frame_size).max(1),
        }
    }

    /// Stream payloads in frames of `chunk_size` bytes
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, self.channel.max_frame_size());
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Send `raw` as a single frame, unchanged, and read the response
    pub async fn command(&mut self, raw: &str) -> Result<Response> {
        self.channel.send(raw.as_bytes()).await?;
        self.read_response().await
    }

    pub async fn ping(&mut self) -> Result<Response> {
        self.simple(Command::Ping).await
    }

    pub async fn version(&mut self) -> Result<Response> {
        self.simple(Command::Version).await
    }

    /// A bare `reload` reply is read as `OK` with result `"reload"`
    pub async fn reload(&mut self) -> Result<Response> {
        self.simple(Command::Reload).await
    }

    pub async fn list_classifiers(&mut self) -> Result<Response> {
        self.simple(Command::ListClassifier).await
    }

    /// `value` is sent as given; the server accepts `true`/`false` in any case
    pub async fn set_classifier(&mut self, name: &str, value: &str) -> Result<Response> {
        self.simple(Command::SetClassifier {
            name: name.to_string(),
            value: value.to_string(),
        })
        .await
    }

    /// Hash a file on the server's filesystem
    pub async fn md5_file(&mut self, path: &str) -> Result<Response> {
        self.simple(Command::Md5File {
            path: path.to_string(),
        })
        .await
    }

    pub async fn md5_stream(&mut self, data: &[u8]) -> Result<Response> {
        self.streaming(Command::Md5Stream, data).await
    }

    pub async fn predict_stream(&mut self, data: &[u8]) -> Result<Response> {
        self.streaming(Command::PredictStream, data).await
    }

    /// Classify a file on the server's filesystem
    pub async fn predict_file(&mut self, path: &str) -> Result<Response> {
        self.simple(Command::PredictFile {
            path: path.to_string(),
        })
        .await
    }

    /// Ask the server to end the connection. The client is consumed.
    pub async fn close(mut self) -> Result<Response> {
        self.simple(Command::Close).await
    }

    async fn simple(&mut self, command: Command) -> Result<Response> {
        self.send_command(&command).await?;
        self.read_response().await
    }

    async fn streaming(&mut self, command: Command, data: &[u8]) -> Result<Response> {
        self.send_command(&command).await?;

        for chunk in data.chunks(self.chunk_size) {
            self.channel.send(chunk).await?;
        }
        self.channel.send(&[]).await?;
        debug!(
            "Streamed {} bytes in {} frames",
            data.len(),
            data.len().div_ceil(self.chunk_size)
        );

        self.read_response().await
    }

    async fn send_command(&mut self, command: &Command) -> Result<()> {
        let line = format!("{}\n", command);
        self.channel.send(line.as_bytes()).await
    }

    async fn read_response(&mut self) -> Result<Response> {
        match self.channel.receive_frame().await? {
            Some(Frame::Data(payload)) => {
                let response = Response::from_bytes(&payload)?;
                debug!("Client received: {}", String::from_utf8_lossy(&payload));
                Ok(response)
            }
            Some(Frame::End) => Err(Error::protocol("server sent an empty response frame")),
            None => Err(Error::ConnectionClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = Client::connect("127.0.0.1", port).await.err().unwrap();
        assert!(matches!(err, Error::Io(_)));
    }
}
