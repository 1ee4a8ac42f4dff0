use log::LevelFilter;

/// Default level for a process role, raised once per `-v`.
///
/// Interactive commands stay quiet so the picker owns the terminal; the
/// daemon reports its lifecycle at `info`.
pub fn level_for(verbose: u8, daemon: bool) -> LevelFilter {
    const LEVELS: [LevelFilter; 5] = [
        LevelFilter::Error,
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];
    let base = if daemon { 2 } else { 1 };
    LEVELS[(base + usize::from(verbose)).min(LEVELS.len() - 1)]
}

/// Installs the global logger. `RUST_LOG` still overrides per module.
pub fn init_logging(verbose: u8, daemon: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level_for(verbose, daemon));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let _ = builder.format_timestamp_millis().try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_the_level() {
        assert_eq!(level_for(0, false), LevelFilter::Warn);
        assert_eq!(level_for(0, true), LevelFilter::Info);
        assert_eq!(level_for(1, false), LevelFilter::Info);
        assert_eq!(level_for(9, true), LevelFilter::Trace);
    }
}
