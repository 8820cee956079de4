use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "kanban",
    about = "Maintenance probe for a kanban hierarchy database",
    version
)]
pub struct Cli {
    /// JSON file with hierarchy settings (defaults apply when omitted)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging stays off without it
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log level used together with --log-dir
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify the core library links
    Ping,

    /// Print the core library version
    Version,

    /// Print per-board list and card counts as JSON
    Stats {
        /// Path to the SQLite database
        #[arg(long)]
        db: PathBuf,
    },

    /// Renumber one sibling set, or every set when no --kind is given
    Renumber {
        /// Path to the SQLite database
        #[arg(long)]
        db: PathBuf,

        /// Member kind of the set: board, list or card
        #[arg(long, requires = "parent")]
        kind: Option<String>,

        /// Owner id for boards, board id for lists, list id for cards
        #[arg(long, requires = "kind")]
        parent: Option<Uuid>,
    },

    /// Report duplicate positions; exits non-zero when any are found
    Check {
        /// Path to the SQLite database
        #[arg(long)]
        db: PathBuf,
    },
}
