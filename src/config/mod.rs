//! Configuration snapshot.
//!
//! # Data Flow
//! ```text
//! keelson.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared via Arc with every subsystem
//!
//! programmatic setup:
//!     ConfigBuilder → validation.rs → Arc<AppConfig>
//! ```
//!
//! Config is immutable once built; there is no global and no set-once
//! cell. Whoever needs it receives the `Arc`.

mod builder;
pub mod loader;
pub mod schema;
pub mod validation;

pub use builder::ConfigBuilder;
pub use loader::{ConfigError, load_config, load_or_default, parse_config};
pub use schema::{
    AppConfig, AppSection, CacheConfig, ConsumerConfig, DatabaseConfig, ElasticsearchConfig,
    LifecycleConfig, LoggingConfig, MessagingConfig, MySqlConfig, PostgresConfig, ProducerConfig,
    RedisConfig, ServerConfig, TopicConfig,
};
pub use validation::{ValidationError, validate_config};
