//! The `mcp-hub` binary
//!
//! Three entry points: an interactive shell (the default), `serve` for the
//! stdio or SSE MCP transport, and `plugins` for a one-shot listing. All
//! diagnostics go to stderr so the stdio transport's stdout stays a pristine
//! protocol stream.

use clap::{Parser, Subcommand, ValueEnum};
use mcp_hub::app::AppContext;
use mcp_hub::commands::Shell;
use mcp_hub::config::{self, HubConfig};
use mcp_hub::core::error::HubResult;
use mcp_hub::plugin::ModuleRegistry;
use mcp_hub::server::run_stdio_session;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcp-hub", version, about = "Universal host for MCP servers")]
struct Cli {
    /// Config file (defaults to ~/.mcp-cli/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the interactive shell (the default)
    Interactive,
    /// Serve MCP to remote clients over one transport
    Serve {
        #[arg(long, value_enum, default_value_t = ServeMode::Sse)]
        mode: ServeMode,
        /// Port for the SSE transport
        #[arg(long, env = "MCP_PORT")]
        port: Option<u16>,
    },
    /// List configured plugins and exit
    Plugins,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ServeMode {
    Stdio,
    Sse,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> HubResult<()> {
    let config_path = cli.config.unwrap_or_else(config::config_path);
    let config = HubConfig::load(&config_path)?;
    let state_dir = config::state_dir();

    let ctx = AppContext::bootstrap(config, ModuleRegistry::with_builtins(), &state_dir).await;

    match cli.command.unwrap_or(Command::Interactive) {
        Command::Interactive => run_interactive(ctx).await,
        Command::Serve {
            mode: ServeMode::Stdio,
            ..
        } => {
            run_stdio_session(ctx.dispatcher.clone(), ctx.manager.clone()).await?;
            ctx.shutdown().await;
            Ok(())
        }
        Command::Serve {
            mode: ServeMode::Sse,
            port,
        } => {
            ctx.start_sse(port).await?;
            tokio::signal::ctrl_c()
                .await
                .map_err(mcp_hub::HubError::from)?;
            ctx.shutdown().await;
            Ok(())
        }
        Command::Plugins => {
            let shell = Shell::new(ctx.clone());
            let listing = shell.execute("plugins list").await;
            println!("{}", listing.output);
            ctx.shutdown().await;
            Ok(())
        }
    }
}

async fn run_interactive(ctx: Arc<AppContext>) -> HubResult<()> {
    let shell = Shell::new(ctx.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while shell.is_running() {
        stdout.write_all(b"mcp> ").await?;
        stdout.flush().await?;

        match lines.next_line().await? {
            Some(line) => {
                let result = shell.execute(&line).await;
                if !result.output.is_empty() {
                    println!("{}", result.output);
                }
            }
            None => break,
        }
    }

    ctx.shutdown().await;
    Ok(())
}
