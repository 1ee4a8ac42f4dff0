use std::env;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};

/// Names the tmux pane that `history --paste` types into.
pub const TARGET_PANE_ENV: &str = "CLIPHOME_TARGET_PANE";

/// Where re-selected text is written back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardSink {
    Xclip,
    System,
}

impl ClipboardSink {
    pub fn choose(use_xclip: bool) -> Self {
        Self::pick(use_xclip, cfg!(target_os = "linux"), binary_on_path("xclip"))
    }

    fn pick(use_xclip: bool, linux: bool, xclip_found: bool) -> Self {
        if use_xclip && linux && !xclip_found {
            info!("xclip not found, falling back to the system clipboard");
        }
        if use_xclip && linux && xclip_found {
            Self::Xclip
        } else {
            Self::System
        }
    }

    pub fn write(self, text: &str) -> Result<()> {
        match self {
            Self::Xclip => pipe_into(
                Command::new("xclip").args(["-in", "-selection", "clipboard"]),
                text,
            )
            .context("failed to write to clipboard with xclip"),
            Self::System => {
                let mut clipboard =
                    arboard::Clipboard::new().context("failed to initialize clipboard")?;
                clipboard
                    .set_text(text.to_owned())
                    .context("failed to write to clipboard")
            }
        }
    }
}

/// Places `text` on the clipboard and, when `paste` is set, delivers it.
///
/// Delivery goes to the tmux pane from [`TARGET_PANE_ENV`] when that is set,
/// otherwise to `out`.
pub fn deliver<W: Write>(text: &str, use_xclip: bool, paste: bool, out: &mut W) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }

    ClipboardSink::choose(use_xclip).write(text)?;
    if !paste {
        return Ok(());
    }

    match env::var(TARGET_PANE_ENV) {
        Ok(pane) if !pane.is_empty() => paste_to_tmux_pane(text, &pane),
        _ => {
            out.write_all(text.as_bytes())?;
            out.flush()?;
            Ok(())
        }
    }
}

pub fn paste_to_tmux_pane(text: &str, pane: &str) -> Result<()> {
    pipe_into(Command::new("tmux").args(["load-buffer", "-"]), text)
        .context("failed to load tmux buffer")?;

    if let Err(err) = run(Command::new("tmux").args(["paste-buffer", "-t", pane, "-dp"])) {
        let _ = Command::new("tmux").arg("delete-buffer").status();
        return Err(err.context("failed to paste to tmux pane"));
    }

    debug!("pasted {} bytes into tmux pane {pane}", text.len());
    Ok(())
}

fn pipe_into(command: &mut Command, input: &str) -> Result<()> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn {:?}", command.get_program()))?;

    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("child stdin was not captured"))?;
        stdin.write_all(input.as_bytes())?;
    }

    let status = child.wait()?;
    if !status.success() {
        bail!("{:?} exited with {status}", command.get_program());
    }
    Ok(())
}

fn run(command: &mut Command) -> Result<()> {
    let status = command
        .stdin(Stdio::null())
        .status()
        .with_context(|| format!("failed to spawn {:?}", command.get_program()))?;
    if !status.success() {
        bail!("{:?} exited with {status}", command.get_program());
    }
    Ok(())
}

fn binary_on_path(name: &str) -> bool {
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| is_executable(&dir.join(name))))
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
