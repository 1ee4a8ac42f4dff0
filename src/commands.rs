use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::daemon::{self, stop_all_instances, SysinfoProcessLister, PROCESS_NAME};
use crate::db::Database;
use crate::history::{browse_history, TerminalPicker};
use crate::paste;
use crate::settings::{AppPaths, Settings};

pub fn start() -> Result<()> {
    if let Err(err) = stop_all_instances(&mut SysinfoProcessLister::new(), PROCESS_NAME) {
        warn!("{err:#}");
    }
    daemon::spawn_detached()?;
    Ok(())
}

pub fn stop() -> Result<()> {
    let stopped = stop_all_instances(&mut SysinfoProcessLister::new(), PROCESS_NAME)?;
    info!("stopped {stopped} daemon(s)");
    Ok(())
}

pub async fn run(paths: &AppPaths, settings: &Settings) -> Result<()> {
    daemon::run_daemon(paths, settings).await
}

pub async fn history(
    paths: &AppPaths,
    settings: &Settings,
    limit: Option<usize>,
    paste: bool,
) -> Result<()> {
    let db = open(paths)?;
    let page_size = settings.page_size(limit);

    let browsed = browse_history(Arc::new(db.clone()), TerminalPicker::new(), page_size).await;
    db.close();
    let output = browsed?;

    paste::deliver(&output, settings.use_xclip, paste, &mut io::stdout())
}

pub async fn clear(paths: &AppPaths) -> Result<()> {
    let db = open(paths)?;
    let cleared = db.reset().await;
    db.close();

    let deleted = cleared.context("failed to clear clipboard history")?;
    info!("cleared {deleted} history entries");
    Ok(())
}

fn open(paths: &AppPaths) -> Result<Database> {
    let db_path = paths.db_path();
    Database::open(db_path.clone())
        .with_context(|| format!("failed to open history at {}", db_path.display()))
}
