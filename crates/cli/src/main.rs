//! Continuum CLI: the main entry point.
//!
//! Commands:
//! - `assemble`: Build context for one tool call and record the user turn
//! - `respond`: Record the model's reply on a thread
//! - `thread`: Inspect or delete a thread
//! - `models`: List eligible models in resolution order
//! - `policy`: Show the active model restrictions
//! - `config`: Show, validate or initialize configuration
//! - `sweep`: Purge expired threads

use clap::{Parser, Subcommand};
use continuum_core::file::FileHandlingMode;
use continuum_core::invocation::ThinkingMode;

mod commands;

#[derive(Parser)]
#[command(
    name = "continuum",
    about = "Continuum: conversation continuity for stateless LLM tool calls",
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
    /// Assemble context for a request and record it as a user turn
    Assemble {
        /// The request text
        #[arg(short, long)]
        prompt: String,

        /// Tool mode (chat, analyze, review, ...)
        #[arg(short, long, default_value = "chat")]
        mode: String,

        /// Continuation ID from a previous call
        #[arg(short, long)]
        continuation: Option<String>,

        /// Explicit model name, or "auto"
        #[arg(long)]
        model: Option<String>,

        /// Absolute file or directory path (repeatable)
        #[arg(short, long = "file")]
        files: Vec<String>,

        /// embedded, summary or reference
        #[arg(long, default_value = "embedded")]
        file_mode: FileHandlingMode,

        /// minimal, low, medium, high or max
        #[arg(long)]
        thinking: Option<ThinkingMode>,

        /// Print the full assembled context as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record the model's reply as an assistant turn
    Respond {
        /// Continuation ID of the thread
        #[arg(short, long)]
        continuation: String,

        /// The reply text
        #[arg(long)]
        content: String,
    },

    /// Inspect threads
    Thread {
        #[command(subcommand)]
        action: ThreadAction,
    },

    /// List eligible models in resolution order
    Models,

    /// Show the active restriction policy
    Policy,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Purge expired threads from the store
    Sweep,
}

#[derive(Subcommand)]
enum ThreadAction {
    /// Show a thread's turns and embedded files
    Show {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Delete a thread
    Delete { id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Validate the configuration file and environment
    Validate,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
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
        Commands::Assemble {
            prompt,
            mode,
            continuation,
            model,
            files,
            file_mode,
            thinking,
            json,
        } => {
            let args = commands::assemble::AssembleArgs {
                prompt,
                mode,
                continuation,
                model,
                files,
                file_mode,
                thinking,
                json,
            };
            commands::assemble::run(args).await?
        }
        Commands::Respond {
            continuation,
            content,
        } => commands::respond::run(&continuation, &content).await?,
        Commands::Thread { action } => match action {
            ThreadAction::Show { id, json } => commands::thread::show(&id, json).await?,
            ThreadAction::Delete { id } => commands::thread::delete(&id).await?,
        },
        Commands::Models => commands::models::run().await?,
        Commands::Policy => commands::policy::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
        Commands::Sweep => commands::sweep::run().await?,
    }

    Ok(())
}
