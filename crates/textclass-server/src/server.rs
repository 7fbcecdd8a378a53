//! Listener and accept loop

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use textclass_classifiers::{ClassifierFactory, ClassifierRegistry};
use textclass_core::{Error, Result};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{ProtocolConfig, ServerConfig};
use crate::connection::ConnectionHandler;

const LISTEN_BACKLOG: u32 = 1024;

/// Pause after a failed accept so a full fd table does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// State shared by every connection handler
pub struct ServerState {
    pub registry: Arc<ClassifierRegistry>,
    pub protocol: ProtocolConfig,
    /// File RELOAD re-reads; `None` makes RELOAD a no-op
    pub config_path: Option<PathBuf>,
}

/// Classifier server
pub struct Server {
    config: ServerConfig,
    state: Arc<ServerState>,
}

impl Server {
    pub fn new(config: ServerConfig, registry: Arc<ClassifierRegistry>) -> Self {
        Self::with_state(config, registry, None)
    }

    /// Build the registry from the configured classifiers
    pub fn from_config(config: ServerConfig, factory: &ClassifierFactory) -> Result<Self> {
        let registry = ClassifierRegistry::from_config(&config.classifiers, &config.dataset, factory)?;
        Ok(Self::new(config, Arc::new(registry)))
    }

    /// Remember the file the configuration came from so RELOAD can re-read it
    pub fn with_config_path(self, path: impl Into<PathBuf>) -> Self {
        let registry = Arc::clone(&self.state.registry);
        Self::with_state(self.config, registry, Some(path.into()))
    }

    fn with_state(
        config: ServerConfig,
        registry: Arc<ClassifierRegistry>,
        config_path: Option<PathBuf>,
    ) -> Self {
        let state = Arc::new(ServerState {
            registry,
            protocol: config.protocol.clone(),
            config_path,
        });
        Self { config, state }
    }

    pub fn registry(&self) -> &Arc<ClassifierRegistry> {
        &self.state.registry
    }

    /// Bind the configured address and start accepting connections.
    ///
    /// Returns as soon as the socket is listening; connections are served
    /// on the current tokio runtime until [`ServerHandle::shutdown`].
    pub async fn start(self) -> Result<ServerHandle> {
        let accept_timeout = self.config.accept_timeout()?;
        let listener = bind(&self.config.address, self.config.port).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        info!("Server listening on {}", local_addr);

        let task = tokio::spawn(accept_loop(
            listener,
            self.state,
            accept_timeout,
            shutdown.clone(),
        ));

        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// Running server
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Connections already accepted run to
    /// completion on their own tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the accept loop to exit
    pub async fn wait(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::internal(format!("accept loop panicked: {}", e)))
    }
}

async fn bind(address: &str, port: u16) -> Result<TcpListener> {
    let addr = tokio::net::lookup_host((address, port))
        .await?
        .next()
        .ok_or_else(|| Error::config(format!("cannot resolve {}:{}", address, port)))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(LISTEN_BACKLOG)?)
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    accept_timeout: Option<Duration>,
    shutdown: CancellationToken,
) {
    let mut next_id: u64 = 0;

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = accept(&listener, accept_timeout) => accepted,
        };

        match accepted {
            Ok(Some((stream, peer))) => {
                next_id += 1;
                metrics::counter!("textclass_connections_total").increment(1);
                debug!(conn = next_id, %peer, "accepted connection");

                if let Err(e) = stream.set_nodelay(true) {
                    debug!(conn = next_id, "set_nodelay failed: {}", e);
                }

                let handler = ConnectionHandler::new(next_id, peer, stream, Arc::clone(&state));
                tokio::spawn(handler.run());
            }
            Ok(None) => trace!("no connection within the accept timeout"),
            Err(e) => {
                warn!("accept failed: {}", e);
                metrics::counter!("textclass_errors_total", "kind" => "accept").increment(1);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    info!("Server stopped accepting connections");
}

/// `Ok(None)` when the accept timeout elapses with nobody connecting
async fn accept(
    listener: &TcpListener,
    timeout: Option<Duration>,
) -> std::io::Result<Option<(TcpStream, SocketAddr)>> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, listener.accept()).await {
            Ok(accepted) => accepted.map(Some),
            Err(_) => Ok(None),
        },
        None => listener.accept().await.map(Some),
    }
}
