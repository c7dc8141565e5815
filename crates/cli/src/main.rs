//! shopwire CLI - the main entry point.
//!
//! Commands:
//! - `serve`    - Start the HTTP gateway
//! - `chat`     - Send one message and stream the reply
//! - `history`  - Print a conversation's stored messages
//! - `tools`    - List the tools the configured servers expose
//! - `config`   - Print the default configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "shopwire",
    about = "shopwire - streaming shopping assistant with remote tools",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a message and stream the reply
    Chat {
        /// The message to send
        #[arg(short, long)]
        message: String,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,

        /// Persona selector (e.g. "standard", "enthusiastic")
        #[arg(short, long)]
        persona: Option<String>,
    },

    /// Print the stored messages of a conversation
    History {
        /// Conversation id
        id: String,
    },

    /// List the tools exposed by the configured tool servers
    Tools,

    /// Print the default configuration
    Config {
        /// Print the config file location instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat {
            message,
            conversation,
            persona,
        } => commands::chat::run(message, conversation, persona).await?,
        Commands::History { id } => commands::history::run(&id).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Config { path } => commands::config_cmd::run(path)?,
    }

    Ok(())
}
