//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use courier_framework::DispatchConfig;
use serde::{Deserialize, Serialize};

// =============================================================================
// BotCreationOptions
// =============================================================================

/// Everything a [`Bot`](crate::Bot) needs to know at construction.
///
/// Read-only once the bot exists. The `Debug` output never shows the token.
///
/// ```toml
/// token = "123456:ABC"
/// name = "Courier Demo"
/// log_updates = true
///
/// [dispatch]
/// policy = "sequential"
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotCreationOptions {
    /// Bot API token.
    pub token: String,

    /// Display name to publish on start.
    pub name: Option<String>,

    /// Long description to publish on start.
    pub description: Option<String>,

    /// Short description to publish on start.
    pub short_description: Option<String>,

    /// The bot's own username. `/cmd@username` only matches when it names
    /// this bot; without it every addressed command falls through.
    pub username: Option<String>,

    /// Deliver matched commands to listeners' `on_message` as well.
    pub run_commands_through_on_message: bool,

    /// Log one `info` line per handler invocation.
    pub log_updates: bool,

    /// Attached as the `bot` field of the lifecycle and dispatch spans.
    pub logger_name: String,

    /// Dispatch loop settings.
    pub dispatch: DispatchConfig,

    /// Logging settings used by [`logging::init_from_config`](crate::logging::init_from_config).
    pub logging: LoggingConfig,
}

impl Default for BotCreationOptions {
    fn default() -> Self {
        Self {
            token: String::new(),
            name: None,
            description: None,
            short_description: None,
            username: None,
            run_commands_through_on_message: false,
            log_updates: false,
            logger_name: default_logger_name(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_logger_name() -> String {
    "courier".to_string()
}

impl BotCreationOptions {
    /// Creates options with the given token and defaults for everything else.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }

    /// Sets the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the short description.
    pub fn short_description(mut self, short_description: impl Into<String>) -> Self {
        self.short_description = Some(short_description.into());
        self
    }

    /// Sets the bot's own username, with or without the leading `@`.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn run_commands_through_on_message(mut self, enabled: bool) -> Self {
        self.run_commands_through_on_message = enabled;
        self
    }

    pub fn log_updates(mut self, enabled: bool) -> Self {
        self.log_updates = enabled;
        self
    }

    pub fn logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger_name = name.into();
        self
    }

    /// Replaces the dispatch settings.
    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Replaces the logging settings.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }
}

impl fmt::Debug for BotCreationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotCreationOptions")
            .field("token", &mask_token(&self.token))
            .field("name", &self.name)
            .field("description", &self.description)
            .field("short_description", &self.short_description)
            .field("username", &self.username)
            .field(
                "run_commands_through_on_message",
                &self.run_commands_through_on_message,
            )
            .field("log_updates", &self.log_updates)
            .field("logger_name", &self.logger_name)
            .field("dispatch", &self.dispatch)
            .field("logging", &self.logging)
            .finish()
    }
}

/// Keeps the numeric bot id in front of `:` and hides the secret part.
fn mask_token(token: &str) -> String {
    match token.split_once(':') {
        Some((id, _)) => format!("{id}:***"),
        None if token.is_empty() => String::new(),
        None => "***".to_string(),
    }
}

// =============================================================================
// LoggingConfig
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base log level; `RUST_LOG` takes precedence when set.
    pub level: LogLevel,

    /// Output format.
    pub format: LogFormat,

    /// Output destination.
    pub output: LogOutput,

    /// Log file path, used when `output = "file"`.
    pub file_path: Option<PathBuf>,

    /// Rotation of the log file.
    pub rotation: LogRotation,

    /// Span lifecycle events to log.
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    pub thread_ids: bool,

    /// Include source file and line.
    pub file_location: bool,

    /// Per-target levels, e.g. `courier_framework = "debug"`.
    pub filters: BTreeMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            filters: BTreeMap::new(),
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the matching [`tracing::Level`].
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "unknown log level '{other}', expected one of trace, debug, info, warn, error"
            )),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// How often the log file is rolled over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Minutely,
    Hourly,
    Daily,
}

/// Which span lifecycle events produce log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}
