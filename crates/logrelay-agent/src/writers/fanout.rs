//! Fanout writer: re-submits a record under several other categories.
//!
//! Fanout never touches a sink itself. Each target category goes back
//! through the ingestion gate as a fresh queue entry, so every copy gets
//! its own lease, its own delivery and its own retry budget from whichever
//! writer ultimately handles it. Its own retry budget is pinned to zero: a
//! re-run would enqueue duplicate copies for the targets that already
//! succeeded.

use async_trait::async_trait;
use tracing::debug;

use crate::config::FanoutWriterConfig;
use crate::error::{ConfigError, WriteError};
use crate::ingest::Ingestor;
use crate::writers::{LogWriter, WriterInfo};

pub struct FanoutWriter {
    targets: Vec<String>,
    ingestor: Ingestor,
}

impl std::fmt::Debug for FanoutWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutWriter")
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

impl FanoutWriter {
    pub fn new(
        category: &str,
        config: &FanoutWriterConfig,
        ingestor: Ingestor,
    ) -> Result<Self, ConfigError> {
        let targets: Vec<String> = config
            .targets
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        if targets.is_empty() {
            return Err(ConfigError::InvalidWriter {
                category: category.to_string(),
                reason: "no [targets] configuration defined".to_string(),
            });
        }

        debug!("initialized fanout log writer for category [{category}] -> {targets:?}");
        Ok(Self { targets, ingestor })
    }

    #[cfg(test)]
    pub(crate) fn targets(&self) -> &[String] {
        &self.targets
    }
}

#[async_trait]
impl LogWriter for FanoutWriter {
    fn info(&self) -> WriterInfo {
        WriterInfo {
            name: "fanout",
            description: "duplicates log messages to other categories",
            retry_seconds: Some(0),
        }
    }

    async fn write(&self, _category: &str, message: &str) -> Result<(), WriteError> {
        for target in &self.targets {
            self.ingestor.submit(target, message)?;
        }
        Ok(())
    }
}
