use clap::Parser;
use tracing_subscriber::EnvFilter;

use fabric_rti_mcp_runtime::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "fabric-rti-mcp",
    version,
    about = "Fabric RTI MCP server — eventstream builder and Kusto tools over stdio"
)]
struct Cli {
    /// Fabric API base URL
    #[arg(
        long,
        env = "FABRIC_API_BASE",
        default_value = "https://api.fabric.microsoft.com/v1"
    )]
    api_url: String,

    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // stdout carries the protocol frames, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = run_mcp(&cli.api_url, cli.command).await;
    std::process::exit(code);
}
