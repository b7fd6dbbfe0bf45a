use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Unknown level names fall back to `info`.
pub(crate) fn parse_level(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}

/// Install the global subscriber. The terminal client logs to stderr so
/// records do not interleave with prompts on stdout.
pub(crate) fn init_logging(level: &str, to_stderr: bool) -> Result<()> {
    let builder = FmtSubscriber::builder().with_max_level(parse_level(level));
    if to_stderr {
        tracing::subscriber::set_global_default(
            builder.with_writer(std::io::stderr).with_target(false).finish(),
        )?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse_case_insensitively() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level(" WARN "), Level::WARN);
        assert_eq!(parse_level("loud"), Level::INFO);
    }
}
