//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use qgate_core::{DispatchOptions, Intents};
use qgate_transport::{GatewayConfig, HttpConfig, RetryPolicy};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QgateConfig {
    /// Bot credentials and dispatch switches.
    #[serde(default)]
    pub bot: BotConfig,

    /// REST client settings.
    #[serde(default)]
    pub http: HttpSettings,

    /// Gateway reconnect settings.
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Bot
// =============================================================================

/// Bot credentials, subscriptions and dispatch switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Application id issued by the platform.
    ///
    /// App ids are numeric, so an integer from a file or `QGATE_BOT__APP_ID`
    /// is accepted and kept as text.
    #[serde(default, deserialize_with = "credential")]
    pub app_id: String,

    /// Bot token issued by the platform.
    #[serde(default, deserialize_with = "credential")]
    pub token: String,

    /// Use the sandbox REST environment.
    #[serde(default)]
    pub sandbox: bool,

    /// Subscribed intents by name, e.g. `["guilds", "public_guild_messages"]`.
    #[serde(default = "default_intents")]
    pub intents: Vec<String>,

    /// Shard indices to run. Empty runs every shard in `0..shard_total`.
    #[serde(default)]
    pub shards: Vec<u32>,

    /// Total shard count. Discovered through `/gateway/bot` when unset.
    #[serde(default)]
    pub shard_total: Option<u32>,

    /// Gateway URL override. Discovered through `/gateway/bot` when unset.
    #[serde(default)]
    pub gateway_url: Option<String>,

    /// Worker threads for synchronous callbacks.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Attach a treated form to guild messages.
    #[serde(default = "default_true")]
    pub message_treat: bool,

    /// Attach a treated form to direct messages.
    #[serde(default = "default_true")]
    pub dm_treat: bool,

    /// Drop delete events the bot caused itself.
    #[serde(default = "default_true")]
    pub filter_self: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            token: String::new(),
            sandbox: false,
            intents: default_intents(),
            shards: Vec::new(),
            shard_total: None,
            gateway_url: None,
            max_workers: default_max_workers(),
            message_treat: true,
            dm_treat: true,
            filter_self: true,
        }
    }
}

impl BotConfig {
    /// Parses the configured intent names.
    pub fn parsed_intents(&self) -> ConfigResult<Intents> {
        Intents::from_names(&self.intents).map_err(ConfigError::UnknownIntent)
    }

    /// Preprocessing switches for the dispatcher.
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            message_treat: self.message_treat,
            dm_treat: self.dm_treat,
            filter_self: self.filter_self,
        }
    }

    /// Shard indices to start for `total` shards.
    pub fn shard_plan(&self, total: u32) -> Vec<u32> {
        if self.shards.is_empty() {
            (0..total).collect()
        } else {
            self.shards.clone()
        }
    }
}

/// Reads a credential given either as a string or as a bare integer.
fn credential<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct CredentialVisitor;

    impl Visitor<'_> for CredentialVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or an integer")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_u128<E: de::Error>(self, value: u128) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_i128<E: de::Error>(self, value: i128) -> Result<String, E> {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(CredentialVisitor)
}

fn default_intents() -> Vec<String> {
    vec!["public_guild_messages".to_string()]
}

fn default_max_workers() -> usize {
    10
}

fn default_true() -> bool {
    true
}

// =============================================================================
// HTTP
// =============================================================================

/// REST client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Base URL override. Derived from `bot.sandbox` when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum concurrent calls.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Re-issue calls that fail with a retryable code.
    #[serde(default = "default_true")]
    pub retry: bool,

    /// Log failed calls at `warn`.
    #[serde(default = "default_true")]
    pub log_errors: bool,

    /// Error codes that trigger a retry.
    #[serde(default)]
    pub retry_codes: Vec<i64>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            retry: true,
            log_errors: true,
            retry_codes: Vec::new(),
        }
    }
}

impl HttpSettings {
    /// Builds the client configuration for `bot`.
    pub fn to_http_config(&self, bot: &BotConfig) -> HttpConfig {
        let retry = RetryPolicy {
            enabled: self.retry,
            log_errors: self.log_errors,
            ..RetryPolicy::default()
        }
        .with_codes(self.retry_codes.iter().copied());

        let mut config = HttpConfig::new(&bot.app_id, &bot.token)
            .sandbox(bot.sandbox)
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_retry(retry);
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        config
    }
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_concurrency() -> usize {
    10
}

// =============================================================================
// Gateway
// =============================================================================

/// Gateway reconnect settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Pause between a disconnect and the next attempt, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Reconnects after which resuming gives way to a fresh identify.
    #[serde(default = "default_max_resume_attempts")]
    pub max_resume_attempts: u32,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_resume_attempts: default_max_resume_attempts(),
        }
    }
}

impl GatewaySettings {
    /// Builds the connection configuration for one shard.
    pub fn to_gateway_config(
        &self,
        url: &str,
        token: String,
        intents: Intents,
        shard_index: u32,
        shard_total: u32,
    ) -> GatewayConfig {
        GatewayConfig::new(url, token, intents)
            .with_shard(shard_index, shard_total)
            .with_reconnect_delay(Duration::from_millis(self.reconnect_delay_ms))
            .with_max_resume_attempts(self.max_resume_attempts)
    }
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_max_resume_attempts() -> u32 {
    qgate_core::MAX_RESUME_ATTEMPTS
}

// =============================================================================
// Logging
// =============================================================================

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
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
    /// Returns the level as a filter directive string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
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

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation of the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level, used when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Log when `shard` and `callback` spans open and close.
    #[serde(default)]
    pub span_events: bool,

    /// Colored output. Always off for files.
    #[serde(default = "default_true")]
    pub ansi: bool,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `qgate_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            rotation: LogRotation::default(),
            span_events: false,
            ansi: true,
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}
