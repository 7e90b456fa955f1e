mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "praxis-cli")]
#[command(about = "Praxis CLI - Drive exercise sessions against a running session service", long_about = None)]
struct Cli {
    /// Session service base URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:3000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a new exercise session
    Open {
        /// Exercise kind: teach, quiz, code, debug
        #[arg(short, long)]
        kind: String,

        /// Topic to fetch content for
        #[arg(short, long)]
        topic: Option<String>,

        /// Seed message shown when the session opens
        #[arg(short, long)]
        seed: Option<String>,
    },

    /// Show the current state of a session
    Show {
        /// Session id
        id: String,
    },

    /// Run a source file against the session's test cases
    Run {
        /// Session id
        id: String,

        /// Path to the source file
        #[arg(short, long)]
        file: String,
    },

    /// Switch the active phase of a multi-phase coding plan
    Phase {
        /// Session id
        id: String,

        /// Zero-based phase index
        index: usize,
    },

    /// Record a passed quiz
    Quiz {
        /// Session id
        id: String,

        /// Comma-separated topics the learner failed along the way
        #[arg(short, long, value_delimiter = ',')]
        failed: Vec<String>,
    },

    /// Submit an explanation for the current debug challenge
    Explain {
        /// Session id
        id: String,

        /// The explanation text
        text: String,
    },

    /// Re-trigger a failed engine acquisition
    Retry {
        /// Session id
        id: String,
    },

    /// Replace the session with a new exercise
    Navigate {
        /// Session id
        id: String,

        /// Exercise kind: teach, quiz, code, debug
        #[arg(short, long)]
        kind: String,

        /// Topic to fetch content for
        #[arg(short, long)]
        topic: Option<String>,

        /// Seed message shown when the replacement opens
        #[arg(short, long)]
        seed: Option<String>,
    },

    /// Close a session and drop its state
    Close {
        /// Session id
        id: String,
    },

    /// Check service health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Open { kind, topic, seed } => {
            commands::open_session(&cli.server, &kind, topic.as_deref(), seed.as_deref()).await?;
        }
        Commands::Show { id } => {
            commands::show_session(&cli.server, &id).await?;
        }
        Commands::Run { id, file } => {
            commands::run_file(&cli.server, &id, &file).await?;
        }
        Commands::Phase { id, index } => {
            commands::select_phase(&cli.server, &id, index).await?;
        }
        Commands::Quiz { id, failed } => {
            commands::quiz_result(&cli.server, &id, failed).await?;
        }
        Commands::Explain { id, text } => {
            commands::explain(&cli.server, &id, &text).await?;
        }
        Commands::Retry { id } => {
            commands::retry(&cli.server, &id).await?;
        }
        Commands::Navigate { id, kind, topic, seed } => {
            commands::navigate(&cli.server, &id, &kind, topic.as_deref(), seed.as_deref())
                .await?;
        }
        Commands::Close { id } => {
            commands::close(&cli.server, &id).await?;
        }
        Commands::Status => {
            commands::status(&cli.server).await?;
        }
    }

    Ok(())
}
