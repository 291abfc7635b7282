//! Writer backends and the per-category registry.
//!
//! A writer owns its private resources (file handle, socket, client) behind
//! its own lock; nothing is shared between writer instances. Adding a
//! backend means implementing [`LogWriter`] and one arm in
//! [`WriterRegistry::from_config`]; the dispatch engine never changes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{WriterConfig, DEFAULT_RETRY_SECONDS};
use crate::error::{ConfigError, WriteError};
use crate::ingest::Ingestor;

pub mod fanout;
pub mod file;
pub mod forward;

pub use fanout::FanoutWriter;
pub use file::FileWriter;
pub use forward::ForwardWriter;

/// Static description a writer advertises about itself, including the retry
/// budget it resolved from its configuration (if any).
#[derive(Debug, Clone)]
pub struct WriterInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub retry_seconds: Option<i64>,
}

/// Capability set every backend implements. A writer is ready for use as
/// soon as its constructor returns; `shutdown` releases its resources and
/// the instance is unusable afterward.
#[async_trait]
pub trait LogWriter: Send + Sync {
    fn info(&self) -> WriterInfo;

    async fn write(&self, category: &str, message: &str) -> Result<(), WriteError>;

    async fn shutdown(&self) -> Result<(), WriteError> {
        Ok(())
    }
}

/// A writer bound to its retry budget: `0` no retry, negative retry forever,
/// positive retry while the message is younger than that many seconds.
pub struct WriterEntry {
    pub writer: Arc<dyn LogWriter>,
    pub retry_seconds: i64,
}

/// One configured writer per category. Built once at startup, immutable
/// thereafter.
pub struct WriterRegistry {
    writers: HashMap<String, WriterEntry>,
}

impl WriterRegistry {
    /// Builds every configured writer. Any writer that fails to construct is
    /// a fatal configuration error, as is the absence of a `default` entry.
    pub async fn from_config(
        log: &HashMap<String, WriterConfig>,
        ingestor: &Ingestor,
    ) -> Result<Self, ConfigError> {
        let mut writers = HashMap::new();
        for (category, conf) in log {
            let category = category.trim().to_lowercase();
            let writer: Arc<dyn LogWriter> = match conf {
                WriterConfig::File(conf) => Arc::new(FileWriter::new(&category, conf)?),
                WriterConfig::Forward(conf) => {
                    Arc::new(ForwardWriter::new(&category, conf).await?)
                }
                WriterConfig::Fanout(conf) => {
                    Arc::new(FanoutWriter::new(&category, conf, ingestor.clone())?)
                }
            };
            let retry_seconds = writer
                .info()
                .retry_seconds
                .unwrap_or(DEFAULT_RETRY_SECONDS);
            writers.insert(
                category,
                WriterEntry {
                    writer,
                    retry_seconds,
                },
            );
        }
        if !writers.contains_key("default") {
            return Err(ConfigError::MissingDefault);
        }
        Ok(Self { writers })
    }

    /// Resolves the writer for a category, falling back to `default`.
    /// `None` can only happen on a registry constructed without validation.
    #[must_use]
    pub fn resolve(&self, category: &str) -> Option<&WriterEntry> {
        self.writers
            .get(category)
            .or_else(|| self.writers.get("default"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.writers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Destroys every writer. Failures are logged; shutdown keeps going.
    pub async fn shutdown(&self) {
        for (category, entry) in &self.writers {
            if let Err(e) = entry.writer.shutdown().await {
                warn!("error shutting down writer for [{category}]: {e}");
            }
        }
    }

    /// Registry from pre-built entries. Used by tests that need writers the
    /// configuration cannot express.
    #[must_use]
    pub fn from_entries(entries: HashMap<String, WriterEntry>) -> Self {
        Self { writers: entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use logrelay_queue::{LogQueue, MemoryQueue};

    fn test_ingestor() -> Ingestor {
        Ingestor::new(Arc::new(MemoryQueue::new()) as Arc<dyn LogQueue>)
    }

    #[tokio::test]
    async fn registry_builds_all_configured_writers() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_yaml(&format!(
            r#"
log:
  default: {{ type: file, root: {root}, file_pattern: "%Y%m%d.log" }}
  fan:     {{ type: fanout, targets: "default" }}
"#,
            root = dir.path().display()
        ))
        .unwrap();

        let registry = WriterRegistry::from_config(&config.log, &test_ingestor())
            .await
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("fan").unwrap().writer.info().name, "fanout");
    }

    #[tokio::test]
    async fn unknown_category_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_yaml(&format!(
            r#"
log:
  default: {{ type: file, root: {root}, file_pattern: "%Y%m%d.log" }}
"#,
            root = dir.path().display()
        ))
        .unwrap();

        let registry = WriterRegistry::from_config(&config.log, &test_ingestor())
            .await
            .unwrap();
        let entry = registry.resolve("never-configured").unwrap();
        assert_eq!(entry.writer.info().name, "file");
    }

    #[tokio::test]
    async fn writer_without_budget_gets_the_default_budget() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_yaml(&format!(
            r#"
log:
  default: {{ type: file, root: {root}, file_pattern: "%Y%m%d.log" }}
  capped:  {{ type: file, root: {root}, file_pattern: "%Y%m%d.log", retry_seconds: 5 }}
"#,
            root = dir.path().display()
        ))
        .unwrap();

        let registry = WriterRegistry::from_config(&config.log, &test_ingestor())
            .await
            .unwrap();
        assert_eq!(
            registry.resolve("default").unwrap().retry_seconds,
            DEFAULT_RETRY_SECONDS
        );
        assert_eq!(registry.resolve("capped").unwrap().retry_seconds, 5);
    }

    #[tokio::test]
    async fn category_keys_are_lowercased() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_yaml(&format!(
            r#"
log:
  DEFAULT: {{ type: file, root: {root}, file_pattern: "%Y%m%d.log" }}
"#,
            root = dir.path().display()
        ))
        .unwrap();

        let registry = WriterRegistry::from_config(&config.log, &test_ingestor())
            .await
            .unwrap();
        assert!(registry.resolve("default").is_some());
    }
}
