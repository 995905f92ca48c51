mod cli;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chat-topics", version, about = "chat-topics — Meetup agenda topics from group-chat history")]
struct App {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a chat export and print ranked discussion topics
    Analyze {
        /// Chat identifier to analyze
        #[arg(long)]
        chat: i64,
        /// Analysis window in days (default from config)
        #[arg(long)]
        days: Option<i64>,
        /// Path to the exported messages JSON file
        #[arg(long)]
        input: String,
        /// Recompute even when a cached result exists
        #[arg(long)]
        force: bool,
        /// Config file path (defaults to the user config dir)
        #[arg(long)]
        config: Option<String>,
    },
    /// Manage the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Evict expired and over-age entries
    Cleanup {
        /// Retention override in days
        #[arg(long)]
        older_than_days: Option<i64>,
    },
    /// Show entry counts
    Stats,
}

fn main() {
    chat_topics::tracing_init::init_stderr_tracing();

    let app = App::parse();
    let result = match app.command {
        Commands::Analyze {
            chat,
            days,
            input,
            force,
            config,
        } => cli::analyze::run(chat, days, &input, force, config.as_deref()),
        Commands::Cache { action } => match action {
            CacheAction::Cleanup { older_than_days } => cli::cache::cleanup(older_than_days),
            CacheAction::Stats => cli::cache::stats(),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
