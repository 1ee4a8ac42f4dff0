//! Background capture daemon and its process lifecycle.

pub mod process;

use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::capture::{run_capture, ClipboardWatcher};
use crate::db::Database;
use crate::retention::clean_old_history;
use crate::settings::{AppPaths, Settings};

pub use process::{stop_all_instances, ProcessInfo, ProcessLister, SysinfoProcessLister};

/// Executable name shared by the daemon and the interactive commands.
pub const PROCESS_NAME: &str = "cliphome";

/// Hidden subcommand the detached daemon is started with.
pub const RUN_SUBCOMMAND: &str = "run";

/// Runs capture in the foreground until SIGINT or SIGTERM.
pub async fn run_daemon(paths: &AppPaths, settings: &Settings) -> Result<()> {
    let db_path = paths.db_path();
    let db = Database::open(db_path.clone())
        .with_context(|| format!("failed to open history at {}", db_path.display()))?;

    if let Err(err) = clean_old_history(&db, settings).await {
        warn!("failed to clean old history: {err}");
    }

    let cancel_token = CancellationToken::new();
    let signals = tokio::spawn(watch_signals(cancel_token.clone()));

    let (mut watcher, payloads) = match ClipboardWatcher::start(cancel_token.clone()).await {
        Ok(started) => started,
        Err(err) => {
            signals.abort();
            db.close();
            return Err(err).context("failed to initialize clipboard");
        }
    };

    info!("capturing clipboard into {}", db_path.display());
    let captured = run_capture(db, payloads, cancel_token.clone()).await;

    cancel_token.cancel();
    if let Err(err) = watcher.stop().await {
        error!("{err:#}");
    }
    signals.abort();

    captured.context("clipboard capture stopped")?;
    info!("daemon stopped");
    Ok(())
}

#[cfg(unix)]
async fn watch_signals(cancel_token: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let streams = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    );
    let (Ok(mut interrupt), Ok(mut terminate), Ok(mut hangup)) = streams else {
        error!("failed to install signal handlers; falling back to ctrl-c only");
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_token.cancel();
        }
        return;
    };

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => return,
            _ = interrupt.recv() => break,
            _ = terminate.recv() => break,
            // The daemon outlives the terminal that started it.
            _ = hangup.recv() => info!("ignoring SIGHUP"),
        }
    }

    info!("shutdown signal received");
    cancel_token.cancel();
}

#[cfg(not(unix))]
async fn watch_signals(cancel_token: CancellationToken) {
    tokio::select! {
        _ = cancel_token.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if result.is_ok() {
                info!("shutdown signal received");
            }
            cancel_token.cancel();
        }
    }
}

/// Relaunches the current executable as a detached daemon.
pub fn spawn_detached() -> Result<u32> {
    let exe = std::env::current_exe().context("failed to locate the current executable")?;

    let mut command = Command::new(&exe);
    command
        .arg(RUN_SUBCOMMAND)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let child = command.spawn().with_context(|| {
        format!(
            "failed to start daemon process ({} {RUN_SUBCOMMAND})",
            exe.display()
        )
    })?;

    info!("daemon started (pid={})", child.id());
    Ok(child.id())
}
