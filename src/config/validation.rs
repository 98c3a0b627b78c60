//! Semantic checks that serde cannot express.

use super::schema::AppConfig;
use thiserror::Error;

/// A single rule violation, keyed by its dotted config path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

const LOG_FORMATS: &[&str] = &["json", "pretty", "compact"];
const LOG_OUTPUTS: &[&str] = &["stdout", "stderr"];
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a snapshot, collecting every violation rather than stopping at the first
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.host.is_empty() {
        errors.push(ValidationError::new("server.host", "must not be empty"));
    }

    let backing = [
        ("database.mysql", config.database.mysql.enabled, &config.database.mysql.host, config.database.mysql.port),
        ("database.postgres", config.database.postgres.enabled, &config.database.postgres.host, config.database.postgres.port),
        ("cache.redis", config.cache.redis.enabled, &config.cache.redis.host, config.cache.redis.port),
        ("elasticsearch", config.elasticsearch.enabled, &config.elasticsearch.host, config.elasticsearch.port),
        ("messaging", config.messaging.enabled, &config.messaging.host, config.messaging.port),
    ];
    for (section, enabled, host, port) in backing {
        if !enabled {
            continue;
        }
        if host.is_empty() {
            errors.push(ValidationError::new(format!("{section}.host"), "must not be empty when enabled"));
        }
        if port == 0 {
            errors.push(ValidationError::new(format!("{section}.port"), "must be non-zero when enabled"));
        }
    }

    let mysql = &config.database.mysql;
    if mysql.enabled && mysql.max_idle_conns > mysql.max_open_conns {
        errors.push(ValidationError::new(
            "database.mysql.max_idle_conns",
            "must not exceed max_open_conns",
        ));
    }
    let postgres = &config.database.postgres;
    if postgres.enabled && postgres.max_idle_conns > postgres.max_open_conns {
        errors.push(ValidationError::new(
            "database.postgres.max_idle_conns",
            "must not exceed max_open_conns",
        ));
    }

    let messaging = &config.messaging;
    if messaging.enabled {
        if messaging.consumer.poll_timeout_ms == 0 {
            errors.push(ValidationError::new("messaging.consumer.poll_timeout_ms", "must be non-zero"));
        }
        if messaging.consumer.partition < 0 {
            errors.push(ValidationError::new("messaging.consumer.partition", "must not be negative"));
        }
        if messaging.producer.queue_capacity == 0 {
            errors.push(ValidationError::new("messaging.producer.queue_capacity", "must be non-zero"));
        }
        if messaging.default_partitions == 0 {
            errors.push(ValidationError::new("messaging.default_partitions", "must be non-zero"));
        }
        if messaging.replication_factor < 1 {
            errors.push(ValidationError::new("messaging.replication_factor", "must be at least 1"));
        }
        if messaging.heartbeat_interval_ms > 0
            && messaging.session_timeout_ms > 0
            && messaging.heartbeat_interval_ms >= messaging.session_timeout_ms
        {
            errors.push(ValidationError::new(
                "messaging.heartbeat_interval_ms",
                "must be lower than session_timeout_ms",
            ));
        }
        for (index, topic) in messaging.topics.iter().enumerate() {
            if topic.name.is_empty() {
                errors.push(ValidationError::new(format!("messaging.topics[{index}].name"), "must not be empty"));
            }
            if topic.partitions == 0 {
                errors.push(ValidationError::new(
                    format!("messaging.topics[{index}].partitions"),
                    "must be non-zero",
                ));
            }
        }
    }

    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        errors.push(ValidationError::new(
            "logging.format",
            format!("must be one of {}", LOG_FORMATS.join(", ")),
        ));
    }
    if !LOG_OUTPUTS.contains(&config.logging.output.as_str()) {
        errors.push(ValidationError::new(
            "logging.output",
            format!("must be one of {}", LOG_OUTPUTS.join(", ")),
        ));
    }
    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "logging.level",
            format!("must be one of {}", LOG_LEVELS.join(", ")),
        ));
    }

    if config.lifecycle.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::new("lifecycle.shutdown_timeout_secs", "must be non-zero"));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
