//! Confab CLI - Command line interface for the sync engine.
//!
//! This tool drives a local Confab change log against a sync server:
//! inspecting pending changes, running sync exchanges, and resolving
//! conflicts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

use chrono::{Local, TimeZone};
use confab_common::{DeviceId, UserId};
use confab_store::{ChangeLog, ConflictStore, SqliteStore, SyncMetadataStore};
use confab_sync::{
    ConflictStrategy, HttpTransport, RepositoryRegistry, SchedulerConfig, SyncConfig, SyncEngine,
    SyncMode, SyncScheduler,
};

#[derive(Parser)]
#[command(name = "confab")]
#[command(about = "Confab - Offline-first sync for shared event planning")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to the local database.
    #[arg(short, long, default_value = "confab.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync exchange with the server.
    Sync {
        /// Server base URL.
        #[arg(short, long)]
        server: Url,

        /// User whose changes should sync.
        #[arg(short, long)]
        user: String,

        /// Device identity for the cursor.
        #[arg(long)]
        device: String,

        /// Bearer token for the server.
        #[arg(short, long, env = "CONFAB_TOKEN")]
        token: String,

        /// Resolve incoming conflicts automatically:
        /// "last-write-wins", "client-wins", or "server-wins".
        #[arg(long)]
        auto_resolve: Option<String>,
    },

    /// Keep syncing on an interval until interrupted.
    Watch {
        /// Server base URL.
        #[arg(short, long)]
        server: Url,

        /// User whose changes should sync.
        #[arg(short, long)]
        user: String,

        /// Device identity for the cursor.
        #[arg(long)]
        device: String,

        /// Bearer token for the server.
        #[arg(short, long, env = "CONFAB_TOKEN")]
        token: String,

        /// Seconds between sync runs.
        #[arg(short, long, default_value = "300")]
        interval: u64,
    },

    /// Show sync state for a device.
    Status {
        /// Device identity.
        #[arg(long)]
        device: String,
    },

    /// List changes waiting to be synced.
    Pending {
        /// User whose queue to show.
        #[arg(short, long)]
        user: String,
    },

    /// List unresolved conflicts.
    Conflicts,

    /// Resolve a stored conflict.
    Resolve {
        /// Conflict id as shown by `conflicts`.
        #[arg(short, long)]
        id: String,

        /// Strategy: "last-write-wins", "client-wins", or "server-wins".
        #[arg(long)]
        strategy: String,

        /// User the corrective change is recorded for.
        #[arg(short, long)]
        user: String,

        /// Device the corrective change is recorded for.
        #[arg(long)]
        device: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Sync {
            server,
            user,
            device,
            token,
            auto_resolve,
        } => cmd_sync(&cli.db, server, &user, &device, &token, auto_resolve.as_deref()).await,

        Commands::Watch {
            server,
            user,
            device,
            token,
            interval,
        } => cmd_watch(&cli.db, server, &user, &device, &token, interval).await,

        Commands::Status { device } => cmd_status(&cli.db, &device).await,

        Commands::Pending { user } => cmd_pending(&cli.db, &user).await,

        Commands::Conflicts => cmd_conflicts(&cli.db).await,

        Commands::Resolve {
            id,
            strategy,
            user,
            device,
        } => cmd_resolve(&cli.db, &id, &strategy, &user, &device).await,
    }
}

fn parse_strategy(s: &str) -> Result<ConflictStrategy> {
    match s {
        "last-write-wins" => Ok(ConflictStrategy::LastWriteWins),
        "client-wins" => Ok(ConflictStrategy::ClientWins),
        "server-wins" => Ok(ConflictStrategy::ServerWins),
        _ => anyhow::bail!("Invalid strategy. Use: last-write-wins, client-wins, or server-wins"),
    }
}

fn format_millis(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn engine_for(
    db: &PathBuf,
    server: Url,
    default_strategy: Option<ConflictStrategy>,
) -> Result<Arc<SyncEngine<SqliteStore, HttpTransport>>> {
    let store = SqliteStore::open(db).context("Failed to open local database")?;
    let transport = HttpTransport::new(server).context("Invalid server URL")?;
    // The CLI has no entity repositories; server changes still land in
    // the log, conflicts are stored, and the cursor advances.
    let (_online_tx, online_rx) = watch::channel(true);
    Ok(Arc::new(SyncEngine::new(
        Arc::new(store),
        Arc::new(transport),
        RepositoryRegistry::new(),
        online_rx,
        SyncConfig {
            default_strategy,
            ..SyncConfig::default()
        },
    )))
}

/// Run one sync exchange.
async fn cmd_sync(
    db: &PathBuf,
    server: Url,
    user: &str,
    device: &str,
    token: &str,
    auto_resolve: Option<&str>,
) -> Result<()> {
    let user_id = UserId::new(user).context("Invalid user id")?;
    let device_id = DeviceId::new(device).context("Invalid device id")?;
    let strategy = auto_resolve.map(parse_strategy).transpose()?;

    info!("Syncing {} ({})", user, device);
    let engine = engine_for(db, server, strategy)?;
    let outcome = engine
        .sync(&user_id, &device_id, token)
        .await
        .context("Sync failed")?;

    println!("Sync completed in {:?}", outcome.duration);
    println!("  Uploaded:  {} changes acknowledged", outcome.synced_count);
    println!("  Applied:   {} server changes", outcome.applied_count);
    if outcome.skipped_count > 0 {
        println!("  Skipped:   {} server changes", outcome.skipped_count);
    }
    if outcome.conflicts_found > 0 {
        println!("  Conflicts: {} (see `confab conflicts`)", outcome.conflicts_found);
    }
    if outcome.requires_full_sync {
        println!("  Server requested a full resync; cursor was reset.");
    } else {
        println!("  Cursor:    {}", format_millis(outcome.new_cursor));
    }

    Ok(())
}

/// Sync on an interval until Ctrl-C.
async fn cmd_watch(
    db: &PathBuf,
    server: Url,
    user: &str,
    device: &str,
    token: &str,
    interval: u64,
) -> Result<()> {
    let user_id = UserId::new(user).context("Invalid user id")?;
    let device_id = DeviceId::new(device).context("Invalid device id")?;

    let engine = engine_for(db, server, None)?;
    let (_online_tx, online_rx) = watch::channel(true);
    let handle = SyncScheduler::new(
        engine,
        user_id,
        device_id,
        token,
        online_rx,
        SchedulerConfig {
            mode: SyncMode::Periodic,
            interval: Duration::from_secs(interval),
            ..SchedulerConfig::default()
        },
    )
    .spawn();

    // Sync once right away, then let the interval take over.
    let outcome = handle.trigger().await.context("Initial sync failed")?;
    println!(
        "Synced {} changes; next run in {}s. Press Ctrl-C to stop.",
        outcome.synced_count, interval
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    handle.shutdown().await;
    println!("Stopped.");

    Ok(())
}

/// Show device sync state.
async fn cmd_status(db: &PathBuf, device: &str) -> Result<()> {
    let device_id = DeviceId::new(device).context("Invalid device id")?;
    let store = SqliteStore::open(db).context("Failed to open local database")?;

    let cursor = store.cursor(&device_id).await?;
    let pending = store.count_pending().await?;
    let failed = store.count_failed().await?;
    let conflicts = store.count_unresolved().await?;

    println!("Sync status for {}:", device);
    match cursor {
        Some(cursor) => {
            println!("  Last sync: {}", format_millis(cursor.last_sync_timestamp));
            if cursor.needs_full_resync {
                println!("  Full resync pending");
            }
        }
        None => println!("  Never synced"),
    }
    println!("  Pending changes:     {}", pending);
    println!("  Failed changes:      {}", failed);
    println!("  Unresolved conflicts: {}", conflicts);

    Ok(())
}

/// List the pending queue.
async fn cmd_pending(db: &PathBuf, user: &str) -> Result<()> {
    let user_id = UserId::new(user).context("Invalid user id")?;
    let store = SqliteStore::open(db).context("Failed to open local database")?;

    let pending = store.pending_for(&user_id).await?;
    if pending.is_empty() {
        println!("No pending changes.");
        return Ok(());
    }

    println!("{} pending changes:", pending.len());
    for record in pending {
        println!(
            "  {} {:7} {}/{} ({})",
            format_millis(record.timestamp),
            record.operation,
            record.entity_kind,
            record.entity_id,
            record.id
        );
    }

    Ok(())
}

/// List unresolved conflicts.
async fn cmd_conflicts(db: &PathBuf) -> Result<()> {
    let store = SqliteStore::open(db).context("Failed to open local database")?;

    let conflicts = store.unresolved().await?;
    if conflicts.is_empty() {
        println!("No unresolved conflicts.");
        return Ok(());
    }

    println!("{} unresolved conflicts:", conflicts.len());
    for conflict in conflicts {
        println!("  {} on {}/{}", conflict.id, conflict.entity_type, conflict.entity_id);
        println!("    local  @ {}: {}", format_millis(conflict.timestamp), conflict.local_version);
        println!(
            "    remote @ {}: {}",
            format_millis(conflict.server_timestamp),
            conflict.remote_version
        );
    }

    Ok(())
}

/// Resolve a conflict by id.
async fn cmd_resolve(db: &PathBuf, id: &str, strategy: &str, user: &str, device: &str) -> Result<()> {
    let user_id = UserId::new(user).context("Invalid user id")?;
    let device_id = DeviceId::new(device).context("Invalid device id")?;
    let strategy = parse_strategy(strategy)?;

    // Resolution is local; the corrective change ships on the next sync,
    // so a placeholder server URL is fine here.
    let placeholder = Url::parse("http://localhost/").context("Failed to build placeholder URL")?;
    let engine = engine_for(db, placeholder, None)?;

    let resolution = engine
        .resolve_conflict(&user_id, &device_id, id, strategy)
        .await
        .context("Failed to resolve conflict")?;

    println!("Conflict {} resolved: {:?}", id, resolution);
    println!("The decision will sync on the next `confab sync`.");

    Ok(())
}
