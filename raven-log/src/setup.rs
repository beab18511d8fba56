use std::env;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Names of the workspace crates that log at full verbosity.
const CRATE_NAMES: &[&str] = &[
    "raven",
    "raven_common",
    "raven_config",
    "raven_log",
    "raven_pii",
    "raven_protocol",
    "raven_transport",
];

/// Controls the log format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    #[default]
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  raven::client > sending event 0f1b2d...
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2020-12-04T12:10:32Z [raven::client] INFO: sending event 0f1b2d...
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2020-12-04T12:11:08.729716Z","level":"INFO","target":"raven::client","fields":{"message":"sending event 0f1b2d..."}}
    /// ```
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for the raven crates.
    #[serde(with = "level_serde")]
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Auto,
        }
    }
}

mod level_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&level.as_str().to_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Builds the default filter: `INFO` for third-party crates, the configured level for ours.
fn default_filter(level: Level) -> EnvFilter {
    let mut directives = vec!["info".to_owned()];
    for name in CRATE_NAMES {
        directives.push(format!("{name}={level}"));
    }
    EnvFilter::new(directives.join(","))
}

/// Initialize the logging system.
///
/// The `RUST_LOG` environment variable overrides the configured level when set.
///
/// # Example
///
/// ```
/// let log_config = raven_log::LogConfig {
///     format: raven_log::LogFormat::Simplified,
///     ..Default::default()
/// };
///
/// raven_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) => default_filter(config.level),
    };

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
            subscriber.pretty().with_ansi(true).try_init()
        }
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            subscriber.compact().with_ansi(false).try_init()
        }
        (LogFormat::Json, _) => subscriber.json().flatten_event(true).try_init(),
    };

    // A global subscriber may already be installed by the host application.
    result.ok();
}
