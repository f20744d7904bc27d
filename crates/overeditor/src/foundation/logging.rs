//! Logging setup

pub use log::{debug, error, info, trace, warn};

/// Start logging before the configured level is known
///
/// Records are shown at `info` until [`set_level`] is called. `RUST_LOG`, when
/// set, wins over both.
pub fn init_deferred() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Trace)
        .parse_env("RUST_LOG")
        .try_init();
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(log::LevelFilter::Info);
    }
}

/// Apply the configured level after [`init_deferred`]
pub fn set_level(level: &str) {
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(parse_level(level));
    }
}

fn parse_level(level: &str) -> log::LevelFilter {
    level.parse().unwrap_or(log::LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), log::LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), log::LevelFilter::Warn);
        assert_eq!(parse_level("verbose"), log::LevelFilter::Info);
    }

    #[test]
    fn test_deferred_init_then_configured_level() {
        init_deferred();
        set_level("warn");

        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(log::max_level(), log::LevelFilter::Warn);
        }
    }
}
