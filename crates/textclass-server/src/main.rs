//! Textclass
//!
//! Serves pluggable text classifiers over a small framed TCP protocol,
//! trains them from configured datasets, and talks to a running server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio::signal;
use tracing::{info, warn};

use textclass_classifiers::{ClassifierFactory, Trainer, TrainingConfig};
use textclass_client::Client;
use textclass_server::{Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "textclass")]
#[command(about = "Text classification server, trainer and client", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the classification server
    Serve {
        /// Configuration file path
        #[arg(short, long, default_value = "server.yaml")]
        config: PathBuf,

        /// Listen address (overrides the configuration file)
        #[arg(short, long)]
        address: Option<String>,

        /// Listen port (overrides the configuration file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Accept timeout in seconds (overrides the configuration file)
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// Train classifiers on a configured dataset
    Train {
        /// Configuration file path
        #[arg(short, long, default_value = "training.yaml")]
        config: PathBuf,

        /// Classifier name, or `all`
        #[arg(long)]
        classifier: Option<String>,

        /// Dataset name
        #[arg(long)]
        dataset: Option<String>,
    },

    /// Send one command to a running server
    Client {
        /// Server address
        #[arg(short, long, default_value = "127.0.0.1", env = "TEXTCLASS_ADDRESS")]
        address: String,

        /// Server port
        #[arg(short, long, default_value = "3333", env = "TEXTCLASS_PORT")]
        port: u16,

        #[command(subcommand)]
        action: ClientAction,
    },
}

#[derive(Subcommand, Debug)]
enum ClientAction {
    Ping,
    Version,
    Reload,
    /// List classifiers and whether they are enabled
    List,
    /// Enable or disable a classifier
    Set { name: String, value: String },
    /// Hash a file on the server's filesystem
    Md5File { path: String },
    /// Stream a local file (`-` for stdin) and hash it on the server
    Md5Stream { input: PathBuf },
    /// Classify a file on the server's filesystem
    PredictFile { path: String },
    /// Stream a local file (`-` for stdin) and classify it
    PredictStream { input: PathBuf },
    Close,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve {
            config,
            address,
            port,
            timeout,
        } => serve(config, address, port, timeout).await,
        Commands::Train {
            config,
            classifier,
            dataset,
        } => train(config, classifier, dataset).await,
        Commands::Client {
            address,
            port,
            action,
        } => client(&address, port, action).await,
    }
}

async fn serve(
    config_path: PathBuf,
    address: Option<String>,
    port: Option<u16>,
    timeout: Option<f64>,
) -> Result<()> {
    info!("Starting textclass server {}", textclass_server::VERSION);

    let mut config = ServerConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(address) = address {
        config.address = address;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if timeout.is_some() {
        config.timeout = timeout;
    }
    info!("Configuration loaded from {}", config_path.display());

    let factory = ClassifierFactory::with_builtins();
    let server = Server::from_config(config, &factory)?.with_config_path(&config_path);
    info!("Classifiers: {}", server.registry().len());

    let handle = server.start().await?;
    info!("Listening on {}", handle.local_addr());

    shutdown_signal().await;
    warn!("Shutdown signal received, stopping server...");

    handle.shutdown();
    handle.wait().await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn train(
    config_path: PathBuf,
    classifier: Option<String>,
    dataset: Option<String>,
) -> Result<()> {
    let config = TrainingConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let trainer = Trainer::new(config, &ClassifierFactory::with_builtins())?;
    let outcomes = trainer
        .run(classifier.as_deref(), dataset.as_deref())
        .await?;

    for outcome in outcomes {
        println!(
            "{}\t{}\t{}",
            outcome.classifier,
            outcome.dataset,
            outcome.output.display()
        );
    }
    Ok(())
}

async fn client(address: &str, port: u16, action: ClientAction) -> Result<()> {
    let mut client = match Client::connect(address, port).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("cannot connect to {}:{}: {}", address, port, e);
            std::process::exit(1);
        }
    };

    let response = match action {
        ClientAction::Ping => client.ping().await?,
        ClientAction::Version => client.version().await?,
        ClientAction::Reload => client.reload().await?,
        ClientAction::List => client.list_classifiers().await?,
        ClientAction::Set { name, value } => client.set_classifier(&name, &value).await?,
        ClientAction::Md5File { path } => client.md5_file(&path).await?,
        ClientAction::Md5Stream { input } => {
            let data = read_input(&input).await?;
            client.md5_stream(&data).await?
        }
        ClientAction::PredictFile { path } => client.predict_file(&path).await?,
        ClientAction::PredictStream { input } => {
            let data = read_input(&input).await?;
            client.predict_stream(&data).await?
        }
        ClientAction::Close => client.close().await?,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_ok() {
        std::process::exit(2);
    }
    Ok(())
}

/// Read a local file, or stdin for `-`
async fn read_input(input: &Path) -> Result<Vec<u8>> {
    if input.as_os_str() == "-" {
        let mut data = Vec::new();
        tokio::io::stdin().read_to_end(&mut data).await?;
        Ok(data)
    } else {
        tokio::fs::read(input)
            .await
            .with_context(|| format!("reading {}", input.display()))
    }
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("textclass=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("textclass=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
