//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Subcommand};
use tidegate_core::tracing_setup::CliLogLevel;
use tidegate_core::{GatewayConfig, Session, sorted_files};
use tidegate_web::Gateway;

/// Configuration flags shared by every command.
///
/// Defaults come from `TIDEGATE_*` environment variables; flags given here
/// override them.
#[derive(Args)]
pub struct GlobalOptions {
    /// Project name the storage directory is derived from
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Storage directory override for the engine's piece storage
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Port for the streaming HTTP endpoint (0 picks an ephemeral port)
    #[arg(long, global = true)]
    pub http_port: Option<u16>,

    /// Port for inbound peer connections
    #[arg(long, global = true)]
    pub peer_port: Option<u16>,

    /// Disable IPv6 networking
    #[arg(long, global = true)]
    pub disable_ipv6: bool,

    /// Keep seeding after downloads complete
    #[arg(long, global = true)]
    pub seed: bool,

    /// Bound on metadata waits in seconds (0 waits indefinitely)
    #[arg(long, global = true, value_name = "SECONDS")]
    pub metadata_timeout: Option<u64>,

    /// Console log level
    #[arg(long, global = true, default_value = "info")]
    pub log_level: CliLogLevel,
}

impl GlobalOptions {
    fn into_config(self) -> GatewayConfig {
        let mut config = GatewayConfig::from_env();
        if let Some(project) = self.project {
            config.engine.project_name = project;
        }
        if let Some(dir) = self.storage_dir {
            config.engine.storage_dir = Some(dir);
        }
        if let Some(port) = self.http_port {
            config.http.port = port;
        }
        if let Some(port) = self.peer_port {
            config.engine.peer_port = Some(port);
        }
        if self.disable_ipv6 {
            config.engine.disable_ipv6 = true;
        }
        if self.seed {
            config.engine.seed = true;
        }
        if let Some(seconds) = self.metadata_timeout {
            config.ingest.metadata_timeout = if seconds == 0 {
                None
            } else {
                Some(Duration::from_secs(seconds))
            };
        }
        config
    }
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming gateway and serve the given torrents
    Serve {
        /// Torrent descriptors: magnet links, URLs, or local .torrent paths
        descriptors: Vec<String>,
    },
    /// Download a torrent to storage without serving it
    Download {
        /// Magnet link, URL, or local .torrent path
        descriptor: String,
    },
    /// Show the indexed file table of a torrent
    Files {
        /// Magnet link, URL, or local .torrent path
        descriptor: String,
        /// Emit the table as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Handle the CLI command
///
/// # Errors
///
/// Returns the first configuration, ingestion, or gateway error the chosen
/// command runs into.
pub async fn handle_command(options: GlobalOptions, command: Commands) -> anyhow::Result<()> {
    let config = options.into_config();
    match command {
        Commands::Serve { descriptors } => serve(config, descriptors).await,
        Commands::Download { descriptor } => download(config, descriptor).await,
        Commands::Files { descriptor, json } => files(config, descriptor, json).await,
    }
}

/// Start the gateway, ingest the descriptors, and serve until Ctrl+C.
async fn serve(config: GatewayConfig, descriptors: Vec<String>) -> anyhow::Result<()> {
    let host = config.http.host.clone();
    let session = Session::init(config)
        .await
        .context("failed to initialize session")?;
    let gateway = Gateway::start(Arc::clone(&session))
        .await
        .context("failed to start streaming gateway")?;
    let port = gateway.port();

    for descriptor in &descriptors {
        match session.ingest(descriptor).await {
            Ok(handle) => {
                println!("Added torrent {}", handle.info_hash());
                for link in session.stream_links(handle.as_ref(), port)? {
                    println!("  {link}");
                }
            }
            Err(e) => eprintln!("Failed to ingest {descriptor}: {e}"),
        }
    }

    let registered = session.list().await;
    println!(
        "Serving {} torrent(s) at http://{host}:{port}/stream",
        registered.len()
    );
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl+C")?;
    println!("Shutting down...");
    gateway.close().await?;
    Ok(())
}

/// Ingest a torrent and wait until the engine has fetched all of it.
async fn download(config: GatewayConfig, descriptor: String) -> anyhow::Result<()> {
    let seed = config.engine.seed;
    let session = Session::init(config)
        .await
        .context("failed to initialize session")?;

    let handle = session
        .ingest(&descriptor)
        .await
        .with_context(|| format!("failed to ingest {descriptor}"))?;
    let label = handle
        .name()
        .unwrap_or_else(|| handle.info_hash().to_string());

    println!("Downloading {label}...");
    handle.wait_completed().await?;
    println!("Download complete: {label}");

    if seed {
        println!("Seeding until interrupted (press Ctrl+C to stop)");
        tokio::signal::ctrl_c()
            .await
            .context("failed to wait for Ctrl+C")?;
    }
    session.close().await?;
    Ok(())
}

/// Print a torrent's files in episode order.
async fn files(config: GatewayConfig, descriptor: String, json: bool) -> anyhow::Result<()> {
    let session = Session::init(config)
        .await
        .context("failed to initialize session")?;

    let handle = session
        .ingest(&descriptor)
        .await
        .with_context(|| format!("failed to ingest {descriptor}"))?;
    let files = sorted_files(handle.files()?);

    if json {
        let rows: Vec<serde_json::Value> = files
            .iter()
            .enumerate()
            .map(|(position, file)| {
                serde_json::json!({
                    "episode": position + 1,
                    "path": file.path,
                    "size": file.length,
                    "streamable": session.media_gate().check(file).is_ok(),
                })
            })
            .collect();
        let output = serde_json::json!({
            "info_hash": handle.info_hash().to_string(),
            "name": handle.name(),
            "files": rows,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Torrent {} ({} files)",
            handle.info_hash(),
            files.len()
        );
        println!("{:>4}  {:>12}  {}", "ep", "bytes", "path");
        for (position, file) in files.iter().enumerate() {
            let note = if session.media_gate().check(file).is_ok() {
                ""
            } else {
                "  (not streamable)"
            };
            println!("{:>4}  {:>12}  {}{note}", position + 1, file.length, file.path);
        }
    }

    session.close().await?;
    Ok(())
}
