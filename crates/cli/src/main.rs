//! TodoClaw CLI, the main entry point.
//!
//! Commands:
//! - `onboard`: Write a starter config file
//! - `gateway`: Start the HTTP chat endpoint
//! - `chat`: Talk to your todo list from the terminal
//! - `tools`: Show the six tools the assistant can call
//! - `doctor`: Diagnose configuration and the tool process

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "todoclaw",
    about = "TodoClaw: manage your todos through natural-language chat",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Onboard,

    /// Start the HTTP chat endpoint
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with your todo list
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Bearer token for the todo service
        #[arg(long, env = "TODOCLAW_TOKEN", hide_env_values = true)]
        token: String,

        /// Override the todo service base URL
        #[arg(long)]
        base_url: Option<String>,
    },

    /// List the tools the assistant can call
    Tools,

    /// Diagnose configuration and the tool process
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Chat {
            message,
            token,
            base_url,
        } => commands::chat::run(message, token, base_url, cli.verbose).await?,
        Commands::Tools => commands::tools::run()?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
