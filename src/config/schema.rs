//! Configuration schema definitions.
//!
//! Every section derives Serde traits and defaults every field, so a
//! minimal (even empty) TOML file yields a usable snapshot.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration snapshot.
///
/// Built once before any subsystem exists and shared as `Arc<AppConfig>`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub messaging: MessagingConfig,
    pub logging: LoggingConfig,
    pub lifecycle: LifecycleConfig,
}

impl AppConfig {
    /// Backing-service sections with `enabled = true`, in startup order.
    ///
    /// Names match the subsystems expected to serve them.
    pub fn enabled_sections(&self) -> Vec<&'static str> {
        [
            ("mysql", self.database.mysql.enabled),
            ("postgres", self.database.postgres.enabled),
            ("redis", self.cache.redis.enabled),
            ("elasticsearch", self.elasticsearch.enabled),
            ("messaging", self.messaging.enabled),
        ]
        .into_iter()
        .filter_map(|(name, enabled)| enabled.then_some(name))
        .collect()
    }
}

/// Application identity.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub version: String,
    pub env: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "keelson".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            env: "development".to_string(),
        }
    }
}

/// HTTP listener for the health surface.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub mysql: MySqlConfig,
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MySqlConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub charset: String,
    pub parse_time: bool,
    pub loc: String,
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    pub conn_max_lifetime_secs: u64,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: "keelson".to_string(),
            charset: "utf8mb4".to_string(),
            parse_time: true,
            loc: "Local".to_string(),
            max_idle_conns: 10,
            max_open_conns: 100,
            conn_max_lifetime_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PostgresConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub sslmode: String,
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    pub conn_max_lifetime_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "keelson".to_string(),
            sslmode: "disable".to_string(),
            max_idle_conns: 10,
            max_open_conns: 100,
            conn_max_lifetime_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub database: u32,
    pub pool_size: u32,
    pub min_idle_conns: u32,
    pub max_conn_age_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            database: 0,
            pool_size: 10,
            min_idle_conns: 5,
            max_conn_age_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub max_idle_conns_per_host: u32,
    pub timeout_secs: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 9200,
            username: String::new(),
            password: String::new(),
            max_idle_conns_per_host: 10,
            timeout_secs: 30,
        }
    }
}

/// Broker connection, producer and consumer settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MessagingConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security_protocol: String,
    pub sasl_mechanism: String,
    pub session_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Create unknown topics on first publish instead of failing delivery.
    pub auto_create_topics: bool,
    /// Partition count for topics created implicitly.
    pub default_partitions: u32,
    /// Replication factor for topics provisioned at startup.
    pub replication_factor: i32,
    /// Topics provisioned while the subsystem initializes.
    pub topics: Vec<TopicConfig>,
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 9092,
            username: String::new(),
            password: String::new(),
            security_protocol: "PLAINTEXT".to_string(),
            sasl_mechanism: "PLAIN".to_string(),
            session_timeout_ms: 30_000,
            heartbeat_interval_ms: 3_000,
            auto_create_topics: false,
            default_partitions: 1,
            replication_factor: 1,
            topics: Vec::new(),
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl MessagingConfig {
    pub fn bootstrap_servers(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Client properties in broker-native key form.
    ///
    /// Empty strings and zero durations are omitted so the broker falls back
    /// to its own defaults.
    pub fn client_properties(&self) -> Vec<(&'static str, String)> {
        let mut props = vec![("bootstrap.servers", self.bootstrap_servers())];
        if !self.security_protocol.is_empty() {
            props.push(("security.protocol", self.security_protocol.clone()));
        }
        if !self.sasl_mechanism.is_empty() {
            props.push(("sasl.mechanism", self.sasl_mechanism.clone()));
        }
        if !self.username.is_empty() {
            props.push(("sasl.username", self.username.clone()));
        }
        if !self.password.is_empty() {
            props.push(("sasl.password", self.password.clone()));
        }
        if self.session_timeout_ms > 0 {
            props.push(("session.timeout.ms", self.session_timeout_ms.to_string()));
        }
        if self.heartbeat_interval_ms > 0 {
            props.push(("heartbeat.interval.ms", self.heartbeat_interval_ms.to_string()));
        }
        props
    }

    /// Same as [`client_properties`](Self::client_properties) with the password masked
    pub fn redacted_properties(&self) -> Vec<(&'static str, String)> {
        self.client_properties()
            .into_iter()
            .map(|(key, value)| {
                if key == "sasl.password" {
                    (key, "********".to_string())
                } else {
                    (key, value)
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default = "default_partitions")]
    pub partitions: u32,
}

fn default_partitions() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProducerConfig {
    /// Maximum envelopes waiting for delivery before submissions are rejected.
    pub queue_capacity: usize,
    /// Upper bound for flushing pending deliveries on close.
    pub flush_timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            flush_timeout_ms: 5_000,
        }
    }
}

impl ProducerConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Partition the consume loop assigns itself to.
    pub partition: i32,
    /// Upper bound of a single poll, and so of cancellation latency.
    pub poll_timeout_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            partition: 0,
            poll_timeout_ms: 100,
        }
    }
}

impl ConsumerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// One of `json`, `pretty`, `compact`.
    pub format: String,
    /// One of `stdout`, `stderr`.
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            output: "stdout".to_string(),
        }
    }
}

/// Bounds for the orchestrator's startup and shutdown phases.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    pub startup_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub health_timeout_secs: u64,
    /// Bound for each close that starts after the shutdown deadline.
    pub close_grace_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: 30,
            shutdown_timeout_secs: 15,
            health_timeout_secs: 5,
            close_grace_ms: 500,
        }
    }
}

impl LifecycleConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}
