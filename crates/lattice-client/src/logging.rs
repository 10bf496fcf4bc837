//! Logging setup for the SDK.
//!
//! Built on `tracing`; the `LATTICE_LOG` environment variable overrides
//! everything and accepts the usual `tracing_subscriber` directive syntax
//! (`LATTICE_LOG=warn,lattice_client::task=trace`).
//!
//! RPC request/response bodies log at `trace` under `lattice_client::task`
//! and `lattice_client::controller`; per-RPC failures and response
//! consistency mismatches log at `warn`. The default install keeps the
//! bodies off. [`LogOptions::verbose`] turns them on when debugging a
//! fanout.

use tracing_subscriber::{fmt, EnvFilter};

/// Output format for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact single-line text for terminals.
    #[default]
    Text,
    /// JSON lines for log aggregators.
    Json,
}

/// Subscriber configuration applied by [`install`].
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter directives used when `LATTICE_LOG` is unset.
    pub default_directives: String,
    pub format: LogFormat,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            default_directives: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LogOptions {
    /// Preset that surfaces per-RPC request/response tracing for the task
    /// and controller layers without drowning in dependency noise.
    pub fn verbose() -> Self {
        Self {
            default_directives:
                "info,lattice_client::task=trace,lattice_client::controller=trace".to_string(),
            format: LogFormat::Text,
        }
    }

    /// Same filter, JSON output.
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }
}

/// Installs the global subscriber.
///
/// Returns false when a subscriber is already installed (the options are
/// ignored in that case); `tracing` only allows one per process.
pub fn install(options: &LogOptions) -> bool {
    let filter = EnvFilter::try_from_env("LATTICE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&options.default_directives));

    let builder = fmt().with_env_filter(filter).with_target(true);
    match options.format {
        LogFormat::Text => builder.compact().try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

/// Installs the default subscriber. Call once at startup; extra calls are
/// no-ops.
pub fn init() {
    let _ = install(&LogOptions::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_rejected() {
        install(&LogOptions::default());
        // Whoever won the race, the global slot is now taken.
        assert!(!install(&LogOptions::verbose()));
        // And plain init stays a no-op rather than panicking.
        init();
    }

    #[test]
    fn test_verbose_preset_targets_sdk_modules() {
        let options = LogOptions::verbose();
        assert!(options.default_directives.contains("lattice_client::task=trace"));
        assert!(options
            .default_directives
            .contains("lattice_client::controller=trace"));
        assert_eq!(options.format, LogFormat::Text);
        assert_eq!(LogOptions::verbose().json().format, LogFormat::Json);
    }
}
