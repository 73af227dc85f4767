use std::path::Path;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use tracing::info;

use crate::{
    classification::aggregate::{aggregate, total_duration, DEFAULT_TOP_N},
    daemon::{
        storage::{
            query::{history, query_visits},
            session_storage::SessionStorageImpl,
        },
        SESSIONS_DIR,
    },
};

use super::{
    output::{print_history, print_stats},
    range::RangeArgs,
};

const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Parser)]
pub struct StatsCommand {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(short, long, default_value_t = DEFAULT_TOP_N, help = "How many sites and applications to show")]
    limit: usize,
}

#[derive(Debug, Parser)]
pub struct HistoryCommand {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT, help = "How many sessions to show, newest first")]
    limit: usize,
}

/// Prints where the time in the range went, grouped by site or application.
pub async fn process_stats_command(app_dir: &Path, command: StatsCommand) -> Result<()> {
    let range = command.range.resolve(Local::now())?;
    let storage = SessionStorageImpl::new(app_dir.join(SESSIONS_DIR))?;

    let visits = query_visits(storage, range).await?;
    info!("Aggregating {} visits", visits.len());
    let total = total_duration(&visits);
    let stats = aggregate(visits, command.limit);

    print_stats(&stats, total);
    Ok(())
}

/// Prints raw sessions, newest first.
pub async fn process_history_command(app_dir: &Path, command: HistoryCommand) -> Result<()> {
    let range = command.range.resolve(Local::now())?;
    let storage = SessionStorageImpl::new(app_dir.join(SESSIONS_DIR))?;

    let sessions = history(storage, range, command.limit).await?;
    print_history(&sessions);
    Ok(())
}

/// Deletes every stored session.
pub async fn process_clear_command(app_dir: &Path) -> Result<()> {
    let mut storage = SessionStorageImpl::new(app_dir.join(SESSIONS_DIR))?;
    let removed = storage.clear().await?;
    println!("Removed {removed} day files");
    Ok(())
}
