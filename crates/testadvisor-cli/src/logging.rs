//! Diagnostic log setup

use crate::config::{LogFormat, Verbosity};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
#[must_use]
pub fn default_filter(verbosity: Verbosity) -> String {
    let level = verbosity.log_level();
    format!("{level},testadvisor={level}")
}

/// Install the global subscriber. Logs go to stderr so stdout stays
/// machine-readable. A second call is a no-op.
pub fn init_tracing(verbosity: Verbosity, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_follows_verbosity() {
        assert_eq!(default_filter(Verbosity::Normal), "warn,testadvisor=warn");
        assert_eq!(default_filter(Verbosity::Debug), "debug,testadvisor=debug");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(Verbosity::Quiet, LogFormat::Text);
        init_tracing(Verbosity::Debug, LogFormat::Json);
    }
}
