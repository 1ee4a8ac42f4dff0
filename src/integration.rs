//! Shell and tmux glue printed by the `completion`, `shell` and `tmux` commands.

use std::io::Write;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::Cli;
use crate::daemon::PROCESS_NAME;

const SHELL_SCRIPT: &str = include_str!("scripts/shell.bash");
const TMUX_SCRIPT: &str = include_str!("scripts/tmux.conf");

pub fn write_completion<W: Write>(out: &mut W) -> Result<()> {
    clap_complete::generate(Shell::Bash, &mut Cli::command(), PROCESS_NAME, out);
    out.flush()?;
    Ok(())
}

pub fn write_shell_script<W: Write>(out: &mut W) -> Result<()> {
    out.write_all(SHELL_SCRIPT.as_bytes())?;
    Ok(())
}

pub fn write_tmux_script<W: Write>(out: &mut W) -> Result<()> {
    out.write_all(TMUX_SCRIPT.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paste::TARGET_PANE_ENV;

    fn captured(write: fn(&mut Vec<u8>) -> Result<()>) -> String {
        let mut out = Vec::new();
        write(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn completion_covers_every_visible_subcommand() {
        let script = captured(write_completion);
        assert!(script.contains("complete"));
        for name in ["start", "stop", "history", "clear", "completion", "shell", "tmux"] {
            assert!(script.contains(name), "missing {name}");
        }
    }

    #[test]
    fn tmux_binding_pastes_back_into_the_calling_pane() {
        let script = captured(write_tmux_script);
        assert!(script.contains("display-popup"));
        assert!(script.contains(&format!("{TARGET_PANE_ENV}=#{{pane_id}}")));
        assert!(script.contains("cliphome history --paste"));
    }

    #[test]
    fn shell_binding_inserts_the_selection() {
        let script = captured(write_shell_script);
        assert!(script.contains("bind -x"));
        assert!(script.contains("cliphome history --paste"));
        assert!(!script.contains(TARGET_PANE_ENV));
    }
}
