use chrono::Local;
use eyre::Result;
use fern::Dispatch;
use log::LevelFilter;

/// Parses a `RUST_LOG` style level, falling back to `Info`
#[must_use]
pub fn parse_level(raw: Option<&str>) -> LevelFilter {
    raw.and_then(|level| level.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Sets up console logging for the engine.
///
/// The level comes from `RUST_LOG` (default `info`). Each line carries the local time,
/// the level and the emitting module.
///
/// # Errors
/// * If a logger is already installed
pub fn setup_logger() -> Result<()> {
    let level = parse_level(std::env::var("RUST_LOG").ok().as_deref());
    Dispatch::new()
        .level(level)
        .chain(std::io::stdout())
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ));
        })
        .apply()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(parse_level(Some(" WARN ")), LevelFilter::Warn);
        assert_eq!(parse_level(Some("chatty")), LevelFilter::Info);
        assert_eq!(parse_level(None), LevelFilter::Info);
    }
}
