//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    BotConfig, GatewaySettings, HttpSettings, LogOutput, LoggingConfig, QgateConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &QgateConfig) -> ConfigResult<()> {
    validate_bot_config(&config.bot)?;
    validate_http_config(&config.http)?;
    validate_gateway_config(&config.gateway)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Checks `bot.shards` against a shard total.
///
/// Runs at load time when `bot.shard_total` is configured, and again once
/// the total is known from gateway discovery.
pub fn validate_shard_plan(bot: &BotConfig, shard_total: u32) -> ConfigResult<()> {
    if shard_total == 0 {
        return Err(ConfigError::invalid("bot.shard_total", "must be greater than 0"));
    }
    match bot.shards.iter().find(|&&index| index >= shard_total) {
        Some(index) => Err(ConfigError::invalid(
            "bot.shards",
            format!("shard {index} is out of range for {shard_total} shards"),
        )),
        None => Ok(()),
    }
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.app_id.trim().is_empty() {
        return Err(ConfigError::MissingField("bot.app_id"));
    }
    if bot.token.trim().is_empty() {
        return Err(ConfigError::MissingField("bot.token"));
    }

    if bot.parsed_intents()?.is_empty() {
        return Err(ConfigError::invalid(
            "bot.intents",
            "at least one intent must be subscribed",
        ));
    }
    if bot.max_workers == 0 {
        return Err(ConfigError::invalid("bot.max_workers", "must be greater than 0"));
    }
    if let Some(total) = bot.shard_total {
        validate_shard_plan(bot, total)?;
    }

    if let Some(url) = &bot.gateway_url
        && !(url.starts_with("ws://") || url.starts_with("wss://"))
    {
        return Err(ConfigError::invalid(
            "bot.gateway_url",
            format!("{url} is not a ws:// or wss:// URL"),
        ));
    }
    Ok(())
}

fn validate_http_config(http: &HttpSettings) -> ConfigResult<()> {
    if http.timeout_ms == 0 {
        return Err(ConfigError::invalid("http.timeout_ms", "must be greater than 0"));
    }
    if http.max_concurrency == 0 {
        return Err(ConfigError::invalid(
            "http.max_concurrency",
            "must be greater than 0",
        ));
    }
    if let Some(url) = &http.base_url
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        return Err(ConfigError::invalid(
            "http.base_url",
            format!("{url} is not an http:// or https:// URL"),
        ));
    }
    Ok(())
}

fn validate_gateway_config(gateway: &GatewaySettings) -> ConfigResult<()> {
    if gateway.max_resume_attempts == 0 {
        return Err(ConfigError::invalid(
            "gateway.max_resume_attempts",
            "must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::MissingField("logging.file_path"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> QgateConfig {
        let mut config = QgateConfig::default();
        config.bot.app_id = "1001".into();
        config.bot.token = "secret".into();
        config
    }

    fn rejected_field(config: &QgateConfig) -> Option<&'static str> {
        validate_config(config).err().and_then(|e| e.field())
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = valid();
        config.bot.token = "  ".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField("bot.token"))
        ));

        let mut config = valid();
        config.bot.app_id.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField("bot.app_id"))
        ));
    }

    #[test]
    fn test_no_intents() {
        let mut config = valid();
        config.bot.intents.clear();
        assert_eq!(rejected_field(&config), Some("bot.intents"));
    }

    #[test]
    fn test_unknown_intent() {
        let mut config = valid();
        config.bot.intents.push("everything".into());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::UnknownIntent(_))
        ));
    }

    #[test]
    fn test_shard_out_of_range() {
        let mut config = valid();
        config.bot.shard_total = Some(2);
        config.bot.shards = vec![0, 2];
        assert_eq!(rejected_field(&config), Some("bot.shards"));

        config.bot.shards = vec![0, 1];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_shard_plan_against_discovered_total() {
        let mut bot = valid().bot;
        bot.shards = vec![3];
        assert!(validate_config(&QgateConfig { bot: bot.clone(), ..valid() }).is_ok());

        let err = validate_shard_plan(&bot, 1).unwrap_err();
        assert_eq!(err.field(), Some("bot.shards"));
        assert!(validate_shard_plan(&bot, 4).is_ok());
        assert_eq!(
            validate_shard_plan(&BotConfig::default(), 0).unwrap_err().field(),
            Some("bot.shard_total")
        );
    }

    #[test]
    fn test_zero_limits() {
        let mut config = valid();
        config.http.max_concurrency = 0;
        assert_eq!(rejected_field(&config), Some("http.max_concurrency"));

        let mut config = valid();
        config.http.timeout_ms = 0;
        assert_eq!(rejected_field(&config), Some("http.timeout_ms"));
    }

    #[test]
    fn test_invalid_urls() {
        let mut config = valid();
        config.bot.gateway_url = Some("https://example.com".into());
        assert_eq!(rejected_field(&config), Some("bot.gateway_url"));

        let mut config = valid();
        config.http.base_url = Some("ftp://example.com".into());
        assert_eq!(rejected_field(&config), Some("http.base_url"));
    }

    #[test]
    fn test_file_logging_needs_path() {
        let mut config = valid();
        config.logging.output = LogOutput::File;
        assert_eq!(rejected_field(&config), Some("logging.file_path"));

        config.logging.file_path = Some("logs/qgate.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
