use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "cliphome",
    version,
    about = "Clipboard history manager",
    long_about = "Records clipboard text in a local history and lets you pick earlier entries back into the clipboard."
)]
pub struct Cli {
    /// Increase log output (repeat for more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the clipboard manager in the background
    Start,

    /// Run the clipboard manager in the foreground
    #[command(hide = true)]
    Run,

    /// Stop the clipboard manager
    Stop,

    /// List clipboard history (use <tab> to pin and select multiple entries)
    History {
        /// Number of entries loaded per page
        #[arg(short, long)]
        limit: Option<usize>,

        /// Paste the selection into the target tmux pane, or print it
        #[arg(short, long)]
        paste: bool,
    },

    /// Clear clipboard history
    Clear,

    /// Print a bash completion script
    #[command(long_about = "Print a bash completion script.\n\nTo load completions run:\n$ source <(cliphome completion | tee -a \"$HOME/.bash_completion\")")]
    Completion,

    /// Print a bash key binding that inserts a history selection
    #[command(long_about = "Print a bash integration script.\n\nTo enable it run:\n$ source <(cliphome shell | tee -a \"$HOME/.bashrc\")")]
    Shell,

    /// Print a tmux popup binding that pastes a history selection
    #[command(long_about = "Print a tmux integration script.\n\nAppend it to your tmux config:\n$ cliphome tmux >> \"$HOME/.tmux.conf\"\n\nThen reload it from inside tmux:\n$ tmux source-file \"$HOME/.tmux.conf\"\n\nRequires tmux 3.2+ (for display-popup).")]
    Tmux,
}

impl Command {
    pub fn is_daemon(&self) -> bool {
        matches!(self, Self::Run)
    }
}
