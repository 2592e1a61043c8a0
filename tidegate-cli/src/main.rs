//! Tidegate CLI - Command-line interface
//!
//! Command-line access to the torrent-to-HTTP streaming gateway.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "tidegate")]
#[command(about = "Stream torrents over HTTP", version)]
struct Cli {
    #[command(flatten)]
    options: commands::GlobalOptions,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tidegate_core::tracing_setup::init_tracing(cli.options.log_level.as_tracing_level(), None)?;

    commands::handle_command(cli.options, cli.command).await
}
