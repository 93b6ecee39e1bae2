//! TutorIA CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Initialize the config directory
//! - `ask`     — Run a single assistant turn against the demo directory
//! - `serve`   — Start the HTTP gateway
//! - `doctor`  — Diagnose configuration and provider health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tutoria",
    about = "TutorIA — AI tutoring pipeline for the school platform",
    version,
    author
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
    /// Initialize configuration
    Onboard,

    /// Run a single assistant turn (uses the built-in demo school data)
    Ask {
        /// The message to send
        message: String,

        /// Platform role of the caller ("aluno", "professor", ...)
        #[arg(short, long, default_value = "aluno")]
        role: String,

        /// Caller user id
        #[arg(short, long, default_value_t = 1)]
        user_id: i64,

        /// Caller display name
        #[arg(short, long, default_value = "Mariana Silva")]
        name: String,

        /// Class id to anchor the turn to
        #[arg(short, long)]
        class_id: Option<i64>,

        /// Resume an existing session
        #[arg(short, long)]
        session: Option<uuid::Uuid>,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Diagnose configuration and provider health
    Doctor,
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
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Ask {
            message,
            role,
            user_id,
            name,
            class_id,
            session,
        } => commands::ask::run(message, role, user_id, name, class_id, session).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
