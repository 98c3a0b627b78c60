use super::loader::ConfigError;
use super::schema::{
    AppConfig, CacheConfig, DatabaseConfig, ElasticsearchConfig, LifecycleConfig, LoggingConfig,
    MessagingConfig, ServerConfig,
};
use super::validation::validate_config;
use std::sync::Arc;

/// Builder for the immutable configuration snapshot
///
/// Sections are adjusted in place; `build` validates once and freezes the
/// result behind an `Arc`. There is no way to mutate a snapshot after it
/// has been built.
///
/// # Example
/// ```
/// use keelson::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .messaging(|m| {
///         m.enabled = true;
///         m.auto_create_topics = true;
///     })
///     .build()
///     .unwrap();
/// assert!(config.messaging.enabled);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing (for example file-loaded) configuration
    pub fn from_config(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn server(mut self, f: impl FnOnce(&mut ServerConfig)) -> Self {
        f(&mut self.config.server);
        self
    }

    pub fn database(mut self, f: impl FnOnce(&mut DatabaseConfig)) -> Self {
        f(&mut self.config.database);
        self
    }

    pub fn cache(mut self, f: impl FnOnce(&mut CacheConfig)) -> Self {
        f(&mut self.config.cache);
        self
    }

    pub fn elasticsearch(mut self, f: impl FnOnce(&mut ElasticsearchConfig)) -> Self {
        f(&mut self.config.elasticsearch);
        self
    }

    pub fn messaging(mut self, f: impl FnOnce(&mut MessagingConfig)) -> Self {
        f(&mut self.config.messaging);
        self
    }

    pub fn logging(mut self, f: impl FnOnce(&mut LoggingConfig)) -> Self {
        f(&mut self.config.logging);
        self
    }

    pub fn lifecycle(mut self, f: impl FnOnce(&mut LifecycleConfig)) -> Self {
        f(&mut self.config.lifecycle);
        self
    }

    /// Validate and freeze the snapshot
    pub fn build(self) -> Result<Arc<AppConfig>, ConfigError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;
        Ok(Arc::new(self.config))
    }
}
