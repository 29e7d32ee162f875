//! snap_report - print stored detections or PPE analytics

use anyhow::Result;
use clap::{Parser, Subcommand};

use safetysnap::analytics::{default_categories, summarize, SyntheticFallback};
use safetysnap::{DetectionStore, Page, SqliteDetectionStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the detection database.
    #[arg(long, env = "SAFETYSNAP_DB_PATH", default_value = "safetysnap.db")]
    db_path: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List detection records in insertion order.
    List {
        #[arg(long)]
        owner_id: Option<i64>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Per-category PPE counts.
    Analytics {
        /// Categories to count (comma separated).
        #[arg(long, value_delimiter = ',')]
        categories: Vec<String>,
        /// Substitute placeholder counts when there is no data.
        #[arg(long)]
        synthetic_fallback: bool,
    },
    /// Register an owner.
    Register { username: String, email: String },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let mut store = SqliteDetectionStore::open(&args.db_path)?;

    match args.command {
        Command::List {
            owner_id,
            limit,
            offset,
        } => {
            let records = store.list(owner_id, Page::new(limit, offset))?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Analytics {
            categories,
            synthetic_fallback,
        } => {
            let categories = if categories.is_empty() {
                default_categories()
            } else {
                categories.iter().map(|c| c.trim().to_lowercase()).collect()
            };
            let mut summary = summarize(&store, &categories)?;
            if synthetic_fallback {
                summary = SyntheticFallback::new().apply(summary);
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Register { username, email } => {
            let owner = store.register_owner(&username, &email)?;
            println!("{}", serde_json::to_string_pretty(&owner)?);
        }
    }
    Ok(())
}
