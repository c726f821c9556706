//! Projpack CLI - inspect and manage project containers from the shell.

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use projpack_core::PackError;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "projpack")]
#[command(about = "Manage single-file project containers", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory containing projpack.toml
    #[arg(long, global = true, default_value = ".")]
    config: PathBuf,

    /// Display name recorded in locks, notes and history (defaults to $USER)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project container from a source document
    Create {
        /// Source document (.xlsx, .pptx, .docx, ...)
        source: PathBuf,
        /// Container path (defaults to the source name with the product extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Product code (XLPJ, PPPJ, DCPJ); inferred from the source when omitted
        #[arg(short, long)]
        product: Option<String>,
    },
    /// Show container metadata, lock and collaboration state
    Info {
        /// Container path
        container: PathBuf,
    },
    /// Export the inner document
    Export {
        /// Container path
        container: PathBuf,
        /// Output file
        output: PathBuf,
    },
    /// Check that files are structurally valid containers
    Validate {
        /// Paths to check
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Inspect or break the exclusive lock
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
    /// Shared sticky notes
    Notes {
        #[command(subcommand)]
        command: NotesCommands,
    },
    /// Inner document history snapshots
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum LockCommands {
    /// Show the current lock holder
    Status {
        /// Container path
        container: PathBuf,
    },
    /// Release the lock
    Release {
        /// Container path
        container: PathBuf,
        /// Remove the lock even if another live holder owns it
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum NotesCommands {
    /// List sticky notes
    List {
        /// Container path
        container: PathBuf,
    },
    /// Add a sticky note
    Add {
        /// Container path
        container: PathBuf,
        /// Note text
        text: String,
        /// Horizontal position
        #[arg(long, default_value = "0")]
        x: f64,
        /// Vertical position
        #[arg(long, default_value = "0")]
        y: f64,
        /// Note color
        #[arg(long)]
        color: Option<String>,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// Snapshot the inner document and save the container
    Add {
        /// Container path
        container: PathBuf,
        /// Snapshot comment
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// List history snapshots
    List {
        /// Container path
        container: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
}

fn main() -> Result<()> {
    // Initialize tracing subscriber
    // Respects RUST_LOG environment variable (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = dispatch(cli);

    if let Err(e) = &result {
        let hint = e
            .chain()
            .find_map(|cause| cause.downcast_ref::<PackError>())
            .and_then(PackError::recovery_suggestion);
        if let Some(hint) = hint {
            eprintln!("{} {}", style("hint:").yellow().bold(), hint);
        }
    }
    result
}

fn dispatch(cli: Cli) -> Result<()> {
    let ctx = commands::Context::new(&cli.config, cli.user)?;

    match cli.command {
        Commands::Create {
            source,
            output,
            product,
        } => commands::create::run(&ctx, &source, output.as_deref(), product.as_deref()),
        Commands::Info { container } => commands::info::run(&ctx, &container),
        Commands::Export { container, output } => commands::export::run(&ctx, &container, &output),
        Commands::Validate { paths } => commands::validate::run(&paths),
        Commands::Lock { command } => match command {
            LockCommands::Status { container } => commands::lock::status(&ctx, &container),
            LockCommands::Release { container, force } => {
                commands::lock::release(&ctx, &container, force)
            }
        },
        Commands::Notes { command } => match command {
            NotesCommands::List { container } => commands::notes::list(&ctx, &container),
            NotesCommands::Add {
                container,
                text,
                x,
                y,
                color,
            } => commands::notes::add(&ctx, &container, &text, x, y, color),
        },
        Commands::History { command } => match command {
            HistoryCommands::Add { container, message } => {
                commands::history::add(&ctx, &container, &message)
            }
            HistoryCommands::List { container } => commands::history::list(&ctx, &container),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => commands::config::show(&ctx),
        },
    }
}
