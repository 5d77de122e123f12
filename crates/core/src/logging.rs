//! Logger construction with two verbosity presets.
//!
//! Both presets write colored console output to stdout. The verbose preset
//! lowers the level to `DEBUG` and adds a timestamp and the call site of
//! every event.

use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

use crate::errors::LoggingError;

/// Timestamp layout of the verbose preset, e.g. `Jan 02 15:04:05.000000000`.
pub const VERBOSE_TIME_FORMAT: &str = "%b %d %H:%M:%S%.9f";

/// Verbosity preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogProfile {
    /// `DEBUG` and above, with timestamp and call site.
    Verbose,
    /// `INFO` and above, message and level only.
    Quiet,
}

impl LogProfile {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            LogProfile::Verbose
        } else {
            LogProfile::Quiet
        }
    }

    /// Minimum level let through by this preset.
    pub fn level(self) -> LevelFilter {
        match self {
            LogProfile::Verbose => LevelFilter::DEBUG,
            LogProfile::Quiet => LevelFilter::INFO,
        }
    }
}

/// Build a console subscriber for `profile` without installing it.
pub fn build_subscriber(profile: LogProfile) -> Box<dyn Subscriber + Send + Sync> {
    let filter = EnvFilter::default().add_directive(profile.level().into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_ansi(true);

    match profile {
        LogProfile::Verbose => Box::new(
            builder
                .with_timer(ChronoLocal::new(VERBOSE_TIME_FORMAT.to_string()))
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .finish(),
        ),
        LogProfile::Quiet => Box::new(builder.without_time().with_target(false).finish()),
    }
}

/// Install the logger for `verbose` as the process-wide default.
///
/// Fails if a global subscriber is already set.
pub fn init_logger(verbose: bool) -> Result<(), LoggingError> {
    let subscriber = build_subscriber(LogProfile::from_verbose(verbose));
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_profile_levels() {
        assert_eq!(LogProfile::from_verbose(true), LogProfile::Verbose);
        assert_eq!(LogProfile::from_verbose(false), LogProfile::Quiet);
        assert_eq!(LogProfile::Verbose.level(), LevelFilter::DEBUG);
        assert_eq!(LogProfile::Quiet.level(), LevelFilter::INFO);
    }

    #[test]
    fn test_quiet_subscriber_drops_debug() {
        let subscriber = build_subscriber(LogProfile::Quiet);
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(Level::INFO));
            assert!(!tracing::enabled!(Level::DEBUG));
        });
    }

    #[test]
    fn test_verbose_subscriber_keeps_debug() {
        let subscriber = build_subscriber(LogProfile::Verbose);
        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(Level::DEBUG));
            assert!(!tracing::enabled!(Level::TRACE));
        });
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_logger(false);
        assert!(matches!(
            init_logger(true),
            Err(LoggingError::AlreadyInitialized(_))
        ));
    }
}
