use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Engine configuration.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file passed to [`SearchConfig::load_from`]
/// 2. Local `.snapgrep.yaml` in the current directory
/// 3. Global `$HOME/.config/snapgrep/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// # Hard caps on result size. These bound memory and response size
/// # regardless of the pattern or the archive contents.
/// limits:
///   max_line_size: 4096
///   max_file_matches: 1000
///   max_line_matches: 100
///   max_offsets: 10
///
/// # Worker count (default: CPU cores)
/// thread_count: 4
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
///
/// # Stop pulling new files once this much time has passed
/// deadline: "30s"
/// ```
///
/// Every field has a default, so an empty file (or no file at all) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result size caps applied by the scanner
    pub limits: Limits,

    /// Number of scanning workers
    /// Defaults to number of CPU cores if not specified
    pub thread_count: NonZeroUsize,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Wall-clock budget for a single scan, e.g. "500ms" or "30s"
    #[serde(
        serialize_with = "serialize_deadline",
        deserialize_with = "deserialize_deadline"
    )]
    pub deadline: Option<Duration>,
}

/// Resource limits for one scan.
///
/// Hitting any of these truncates the output and sets the matching
/// `limit_hit` flag; it never fails the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Lines longer than this many bytes are not matched
    pub max_line_size: usize,
    /// Maximum number of files reported per search
    pub max_file_matches: usize,
    /// Maximum number of line matches reported per file
    pub max_line_matches: usize,
    /// Maximum number of offsets reported per line
    pub max_offsets: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_size: 4096,
            max_file_matches: 1000,
            max_line_matches: 100,
            max_offsets: 10,
        }
    }
}

impl Limits {
    /// Resolves a per-request file match cap against the configured maximum.
    /// Zero, missing, or oversized requests fall back to `max_file_matches`.
    pub fn file_match_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(n) if n > 0 && n <= self.max_file_matches => n,
            _ => self.max_file_matches,
        }
    }
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn serialize_deadline<S>(deadline: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match deadline {
        Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_deadline<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom))
        .transpose()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            thread_count: default_thread_count(),
            log_level: default_log_level(),
            deadline: None,
        }
    }
}

impl SearchConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from a specific file
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("snapgrep/config.yaml")),
            Some(PathBuf::from(".snapgrep.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicit file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Sets up a global `tracing` subscriber at `log_level`, unless `RUST_LOG`
    /// says otherwise. Calling this twice is harmless.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.log_level.as_str()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }
}
