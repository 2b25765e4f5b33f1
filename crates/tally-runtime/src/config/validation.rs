//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AgentConfig, ApiConfig, LogOutput, LoggingConfig, TallyConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &TallyConfig) -> ConfigResult<()> {
    validate_agent_config(&config.agent)?;
    validate_api_config(&config.api)?;
    validate_logging_config(&config.logging)?;
    validate_global_tags(config)?;
    Ok(())
}

fn validate_agent_config(agent: &AgentConfig) -> ConfigResult<()> {
    if agent.interval.as_nanos() <= 0 {
        return Err(ConfigError::validation("agent.interval must be greater than 0"));
    }
    if agent.flush_interval.as_nanos() <= 0 {
        return Err(ConfigError::validation(
            "agent.flush_interval must be greater than 0",
        ));
    }
    if agent.metric_batch_size == 0 {
        return Err(ConfigError::validation(
            "agent.metric_batch_size must be greater than 0",
        ));
    }
    if agent.metric_buffer_limit < agent.metric_batch_size {
        return Err(ConfigError::validation(
            "agent.metric_buffer_limit must be at least agent.metric_batch_size",
        ));
    }
    Ok(())
}

fn validate_api_config(api: &ApiConfig) -> ConfigResult<()> {
    if api.update_poll_interval.as_nanos() <= 0 {
        return Err(ConfigError::validation(
            "api.update_poll_interval must be greater than 0",
        ));
    }
    if api.update_poll_interval >= api.update_timeout {
        return Err(ConfigError::validation(
            "api.update_poll_interval must be shorter than api.update_timeout",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }
    Ok(())
}

fn validate_global_tags(config: &TallyConfig) -> ConfigResult<()> {
    if let Some(key) = config.global_tags.keys().find(|key| key.is_empty()) {
        return Err(ConfigError::validation(format!(
            "global_tags contains an empty key (value {:?})",
            config.global_tags[key.as_str()]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tally_core::Duration;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&TallyConfig::default()).is_ok());
    }

    #[test]
    fn buffer_must_hold_a_batch() {
        let mut config = TallyConfig::default();
        config.agent.metric_batch_size = 500;
        config.agent.metric_buffer_limit = 100;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn intervals_must_be_positive() {
        let mut config = TallyConfig::default();
        config.agent.interval = Duration::ZERO;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn poll_shorter_than_timeout() {
        let mut config = TallyConfig::default();
        config.api.update_poll_interval = Duration::from_secs(60);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn file_output_needs_path() {
        let mut config = TallyConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
        config.logging.file_path = Some("tally.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
