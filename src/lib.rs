pub mod capture;
pub mod cli;
mod commands;
pub mod daemon;
pub mod db;
pub mod history;
pub mod integration;
pub mod paste;
pub mod retention;
pub mod settings;
pub mod utils;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command};
use settings::{AppPaths, Settings};
use utils::logging::init_logging;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.command.is_daemon());

    log::debug!("cliphome starting: {:?}", cli.command);

    match cli.command {
        Command::Start => return commands::start(),
        Command::Stop => return commands::stop(),
        Command::Completion => return integration::write_completion(&mut std::io::stdout()),
        Command::Shell => return integration::write_shell_script(&mut std::io::stdout()),
        Command::Tmux => return integration::write_tmux_script(&mut std::io::stdout()),
        _ => {}
    }

    let paths = AppPaths::resolve()?;
    let settings = Settings::load(&paths.settings_path());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;

    runtime.block_on(async {
        match cli.command {
            Command::Run => commands::run(&paths, &settings).await,
            Command::History { limit, paste } => {
                commands::history(&paths, &settings, limit, paste).await
            }
            Command::Clear => commands::clear(&paths).await,
            Command::Start
            | Command::Stop
            | Command::Completion
            | Command::Shell
            | Command::Tmux => Ok(()),
        }
    })
}
