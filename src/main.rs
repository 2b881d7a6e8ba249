//! # Stockroom CLI (`stk`)
//!
//! The `stk` binary is the primary interface for Stockroom. It runs the
//! REST API server and provides the management commands the original
//! browser client offered: a searchable item grid, a detail view, edits
//! with conflict-safe saves, a low-stock alert feed, and the local change
//! history.
//!
//! ## Usage
//!
//! ```bash
//! stk --config ./config/stk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `stk init` | Create the SQLite database and run schema migrations |
//! | `stk serve` | Start the REST API server |
//! | `stk list` | List items, optionally filtered |
//! | `stk show <id>` | Show one item in full |
//! | `stk add` | Create an item from a JSON draft file |
//! | `stk update <id>` | Replace an item from a draft, retrying conflicts |
//! | `stk set-stock <id>` | Adjust one color's stock level |
//! | `stk delete <id>` | Delete an item |
//! | `stk alerts` | Show variants below their minimum stock |
//! | `stk history list` | Show the local change history |
//! | `stk history remove <id>` | Remove one history entry |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stockroom::{alerts, config, manage, migrate, server};

/// Stockroom CLI — inventory tracking for catalog items with per-color
/// stock levels.
#[derive(Parser)]
#[command(
    name = "stk",
    about = "Stockroom — inventory tracking for catalog items with per-color stock levels",
    version,
    long_about = "Stockroom tracks catalog items and their per-color stock levels through a \
    REST API backed by SQLite. Edits ride an optimistic-concurrency save that retries version \
    conflicts, stock movements land in a local audit history, and variants below their reorder \
    threshold surface as alerts."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/stk.toml`. Database paths, the server bind
    /// address, API timeouts, and retry bounds are all read from this file.
    #[arg(long, global = true, default_value = "./config/stk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the items table. This command
    /// is idempotent; running it multiple times is safe.
    Init,

    /// Start the REST API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// item collection until the process is terminated.
    Serve,

    /// List all items.
    ///
    /// The grid view: one line per item with price, color count, and total
    /// stock.
    List {
        /// Filter by a case-insensitive match on name or catalog number.
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one item in full.
    Show {
        /// Item id.
        id: String,
    },

    /// Create an item from a JSON draft file.
    ///
    /// The draft carries the form fields (`catalogNumber`, `displayName`,
    /// `price`, `colorVariants`); numeric fields may be written as numbers
    /// or strings. Validation failures are reported per field.
    Add {
        /// Path to the JSON draft.
        #[arg(long)]
        draft: PathBuf,

        /// Attach a local image file as an inline `data:` URL.
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Update an item from a JSON draft file.
    ///
    /// Saves through the conflict-retry loop: on a version conflict the
    /// authoritative record is refetched, the edits are re-applied, and the
    /// write is resubmitted up to the configured attempt ceiling.
    Update {
        /// Item id.
        id: String,

        /// Path to the JSON draft.
        #[arg(long)]
        draft: PathBuf,

        /// Attach a local image file as an inline `data:` URL.
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Set one color's stock level (and optionally its minimum).
    ///
    /// A shortcut for the common quick-edit: fetches the item, changes just
    /// the named variant, and saves through the conflict-retry loop.
    SetStock {
        /// Item id.
        id: String,

        /// Color variant to adjust.
        #[arg(long)]
        color: String,

        /// New stock level.
        #[arg(long)]
        stock: i64,

        /// New minimum stock (reorder threshold).
        #[arg(long)]
        min_stock: Option<i64>,
    },

    /// Delete an item.
    ///
    /// The item's snapshot is kept in the local history so the audit trail
    /// stays readable after the record is gone.
    Delete {
        /// Item id.
        id: String,
    },

    /// Show variants below their minimum stock.
    Alerts {
        /// Keep polling at the configured interval instead of exiting.
        #[arg(long)]
        watch: bool,
    },

    /// Inspect or prune the local change history.
    History {
        #[command(subcommand)]
        action: HistoryCmd,
    },
}

/// History subcommands.
#[derive(Subcommand)]
enum HistoryCmd {
    /// List history entries, newest first.
    List {
        /// Filter by a case-insensitive match on name or catalog number.
        #[arg(long)]
        search: Option<String>,
    },
    /// Remove one history entry by id.
    Remove {
        /// History entry id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .init();
            server::run_server(&cfg).await?;
        }
        Commands::List { search } => {
            manage::run_list(&cfg, search.as_deref()).await?;
        }
        Commands::Show { id } => {
            manage::run_show(&cfg, &id).await?;
        }
        Commands::Add { draft, image } => {
            manage::run_add(&cfg, &draft, image.as_deref()).await?;
        }
        Commands::Update { id, draft, image } => {
            manage::run_update(&cfg, &id, &draft, image.as_deref()).await?;
        }
        Commands::SetStock {
            id,
            color,
            stock,
            min_stock,
        } => {
            manage::run_set_stock(&cfg, &id, &color, stock, min_stock).await?;
        }
        Commands::Delete { id } => {
            manage::run_delete(&cfg, &id).await?;
        }
        Commands::Alerts { watch } => {
            alerts::run_alerts(&cfg, watch).await?;
        }
        Commands::History { action } => match action {
            HistoryCmd::List { search } => {
                manage::run_history_list(&cfg, search.as_deref()).await?;
            }
            HistoryCmd::Remove { id } => {
                manage::run_history_remove(&cfg, &id).await?;
            }
        },
    }

    Ok(())
}
