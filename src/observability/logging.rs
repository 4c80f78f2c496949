//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default filter when neither `RUST_LOG` nor a config filter is set.
const DEFAULT_FILTER: &str = "simple_crud=info,tower_http=info";

/// Filter used with `--verbose`.
const VERBOSE_FILTER: &str = "simple_crud=debug,tower_http=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, returning `None` for unknown names.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
}

impl Clone for LoggingConfig {
    fn clone(&self) -> Self {
        Self {
            format: self.format,
            filter: EnvFilter::new(self.filter.to_string()),
            file: self.file.clone(),
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// Filter precedence: `--verbose`, then `RUST_LOG`, then the config file,
    /// then the built-in default.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::from_settings_with(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_settings`], reading variables through `lookup`.
    #[must_use]
    pub fn from_settings_with(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let format = lookup("SIMPLE_CRUD_LOG_FORMAT")
            .as_deref()
            .and_then(LogFormat::parse)
            .or_else(|| {
                settings
                    .and_then(|s| s.format.as_deref())
                    .and_then(LogFormat::parse)
            })
            .unwrap_or_default();

        let file = lookup("SIMPLE_CRUD_LOG_FILE")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.and_then(|s| s.file.clone()));

        let directive = if verbose {
            VERBOSE_FILTER.to_string()
        } else {
            lookup("RUST_LOG")
                .filter(|value| !value.trim().is_empty())
                .or_else(|| settings.and_then(|s| s.filter.clone()))
                .unwrap_or_else(|| DEFAULT_FILTER.to_string())
        };

        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        Self {
            format,
            filter,
            file,
        }
    }
}
