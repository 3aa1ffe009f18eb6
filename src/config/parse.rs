use super::types::*;
use crate::config::{expand_env_vars, unset_env_vars};
use crate::sequence::RegexSequenceSource;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string)
}

/// Parse and validate a config from a YAML string
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(yaml);

    check_unexpanded_vars(&yaml_string)?;

    let config: Config = serde_yaml::from_str(&yaml_string)?;

    validate_config(&config)?;

    Ok(config)
}

/// Any `$env{}` reference still present names an unset variable
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let unset = unset_env_vars(yaml_string);
    if unset.is_empty() {
        return Ok(());
    }

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}",
        unset.join(", ")
    )))
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.channel_id.trim().is_empty() {
        errors.push("channel_id cannot be empty".to_string());
    }

    if let Err(e) = RegexSequenceSource::new(&config.sequence.pattern) {
        errors.push(format!(
            "sequence.pattern '{}': {}",
            config.sequence.pattern, e
        ));
    }

    validate_orderer(&config.orderer, &mut errors);
    validate_dispatcher(&config.dispatcher, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_orderer(orderer: &OrdererConfig, errors: &mut Vec<String>) {
    if let Err(e) = orderer.batch_size.validate() {
        errors.push(format!("orderer.batch_size: {}", e));
    }

    if orderer.batch_timeout.is_zero() {
        errors.push("orderer.batch_timeout must be greater than zero".to_string());
    }

    if orderer.channel_capacity == 0 {
        errors.push("orderer.channel_capacity must be greater than zero".to_string());
    }
}

fn validate_dispatcher(dispatcher: &DispatcherConfig, errors: &mut Vec<String>) {
    if dispatcher.queue_capacity == 0 {
        errors.push("dispatcher.queue_capacity must be greater than zero".to_string());
    }

    if dispatcher.signal_capacity == 0 {
        errors.push("dispatcher.signal_capacity must be greater than zero".to_string());
    }

    if dispatcher.high_water_mark == 0 {
        errors.push("dispatcher.high_water_mark must be greater than zero".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorder::DuplicatePolicy;
    use crate::sequence::ParseErrorPolicy;
    use std::time::Duration;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("channel_id: mychannel\n").unwrap();

        assert_eq!(config.channel_id, "mychannel");
        assert_eq!(config.sequence.on_parse_error, ParseErrorPolicy::Reject);
        assert_eq!(config.sequence.on_duplicate, DuplicatePolicy::Reject);
        assert_eq!(config.orderer.batch_size.max_message_count, 10);
        assert_eq!(config.orderer.batch_timeout, Duration::from_secs(2));
        assert_eq!(config.dispatcher.queue_capacity, 100_000);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
channel_id: ledger1
sequence:
  pattern: '^tx(?P<seq>\d+)$'
  on_parse_error: zero
  on_duplicate: overwrite
orderer:
  batch_size:
    preferred_max_bytes: 2048
    max_message_count: 50
  batch_timeout: 250ms
  channel_capacity: 64
dispatcher:
  queue_capacity: 10
  signal_capacity: 20
  high_water_mark: 5
"#;
        let config = parse_config(yaml).unwrap();

        assert_eq!(config.sequence.on_parse_error, ParseErrorPolicy::Zero);
        assert_eq!(config.sequence.on_duplicate, DuplicatePolicy::Overwrite);
        assert_eq!(config.orderer.batch_size.preferred_max_bytes, 2048);
        assert_eq!(config.orderer.batch_timeout, Duration::from_millis(250));
        assert_eq!(config.orderer.channel_capacity, 64);
        assert_eq!(config.dispatcher.signal_capacity, 20);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let yaml = r#"
channel_id: ""
sequence:
  pattern: '^(\d+)$'
orderer:
  batch_size:
    preferred_max_bytes: 0
    max_message_count: 10
  batch_timeout: 0s
dispatcher:
  queue_capacity: 0
"#;
        let err = parse_config(yaml).unwrap_err();
        let ConfigError::ValidationList(errors) = err else {
            panic!("expected validation list, got {:?}", err);
        };

        assert_eq!(errors.len(), 5);
        assert!(errors.iter().any(|e| e.contains("channel_id")));
        assert!(errors.iter().any(|e| e.contains("'seq' capture group")));
        assert!(errors.iter().any(|e| e.contains("preferred_max_bytes")));
        assert!(errors.iter().any(|e| e.contains("batch_timeout")));
        assert!(errors.iter().any(|e| e.contains("queue_capacity")));
    }

    #[test]
    fn test_unknown_policy_is_yaml_error() {
        let yaml = "channel_id: c\nsequence:\n  on_parse_error: explode\n";
        assert!(matches!(parse_config(yaml), Err(ConfigError::YamlParse(_))));
    }

    #[test]
    fn test_env_expansion_in_channel_id() {
        std::env::set_var("TXORDER_TEST_CHANNEL", "fromenv");
        let config = parse_config("channel_id: $env{TXORDER_TEST_CHANNEL}\n").unwrap();
        assert_eq!(config.channel_id, "fromenv");
        std::env::remove_var("TXORDER_TEST_CHANNEL");
    }

    #[test]
    fn test_unset_env_var_is_reported() {
        let err = parse_config("channel_id: $env{TXORDER_SURELY_UNSET_VAR}\n").unwrap_err();
        assert!(err.to_string().contains("TXORDER_SURELY_UNSET_VAR"));
    }
}
