use std::path::PathBuf;

use clap::{Parser, Subcommand};

use astro_assist::admin;
use astro_assist::store::LibSqlBackend;

/// Manage astro-assist user profiles and the request queue.
#[derive(Parser, Debug)]
#[command(name = "manage-user", version, about, long_about = None)]
struct Cli {
    /// Database file (defaults to ASTRO_DB_PATH, then ./data/astro-assist.db).
    #[arg(long, env = "ASTRO_DB_PATH", default_value = "./data/astro-assist.db")]
    db: PathBuf,

    /// Queue inspected by `dead-letters`.
    #[arg(long, env = "ASTRO_QUEUE_NAME", default_value = "astrology_requests")]
    queue: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List all profiles by priority.
    List,
    /// Show one profile.
    Get { user_id: i64 },
    /// Allow a profile to ask questions again.
    Activate { user_id: i64 },
    /// Pause a profile.
    Deactivate { user_id: i64 },
    /// Set priority (1 = highest, 10 = lowest).
    Priority { user_id: i64, priority: u8 },
    /// Zero a profile's strike count.
    ResetStrikes { user_id: i64 },
    /// List dead-lettered queue items.
    DeadLetters {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Return a dead-lettered item to the queue.
    Requeue { item_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let db = LibSqlBackend::new_local(&cli.db).await.map_err(|e| {
        anyhow::anyhow!("failed to open database at {}: {e}", cli.db.display())
    })?;

    let out = match cli.command {
        Commands::List => admin::list_users(&db).await?,
        Commands::Get { user_id } => admin::get_user(&db, user_id).await?,
        Commands::Activate { user_id } => admin::set_active(&db, user_id, true).await?,
        Commands::Deactivate { user_id } => admin::set_active(&db, user_id, false).await?,
        Commands::Priority { user_id, priority } => {
            admin::set_priority(&db, user_id, priority).await?
        }
        Commands::ResetStrikes { user_id } => admin::reset_strikes(&db, user_id).await?,
        Commands::DeadLetters { limit } => admin::dead_letters(&db, &cli.queue, limit).await?,
        Commands::Requeue { item_id } => admin::requeue(&db, item_id).await?,
    };
    println!("{out}");
    Ok(())
}
