//! Rotating local-file writer.
//!
//! The destination file name is a strftime pattern evaluated against the
//! current local time on every write; when the evaluated name changes, the
//! open file is flushed, synced and closed before the new one is opened.
//! One record per line, either `category<TAB>message` or a single-line JSON
//! object, appended so restarts and rotation never truncate.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::FileWriterConfig;
use crate::error::{ConfigError, WriteError};
use crate::writers::{LogWriter, WriterInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordFormat {
    Tsv,
    Json,
}

#[derive(Debug, Default)]
struct FileState {
    current_name: String,
    file: Option<File>,
}

#[derive(Debug)]
pub struct FileWriter {
    category: String,
    root: PathBuf,
    pattern: String,
    format: RecordFormat,
    retry_seconds: Option<i64>,
    state: Mutex<FileState>,
}

impl FileWriter {
    pub fn new(category: &str, config: &FileWriterConfig) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidWriter {
            category: category.to_string(),
            reason,
        };

        let pattern = config.file_pattern.trim().to_string();
        if pattern.is_empty() {
            return Err(invalid("no [file_pattern] configuration defined".into()));
        }
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(invalid(format!("invalid strftime pattern [{pattern}]")));
        }

        // Unsupported or unset formats fall back to JSON.
        let format = match config.format.as_deref().map(str::trim) {
            Some("tsv") => RecordFormat::Tsv,
            _ => RecordFormat::Json,
        };

        std::fs::create_dir_all(&config.root)
            .map_err(|e| invalid(format!("cannot create root directory: {e}")))?;

        debug!("initialized file log writer for category [{category}]");
        Ok(Self {
            category: category.to_string(),
            root: config.root.clone(),
            pattern,
            format,
            retry_seconds: config.retry_seconds,
            state: Mutex::new(FileState::default()),
        })
    }

    fn target_name(&self, now: &DateTime<Local>) -> String {
        now.format(&self.pattern).to_string()
    }

    fn format_record(&self, category: &str, message: &str) -> String {
        match self.format {
            RecordFormat::Tsv => format!("{category}\t{}", message.trim()),
            RecordFormat::Json => serde_json::json!({
                "category": category,
                "message": message.trim(),
            })
            .to_string(),
        }
    }

    async fn sync_and_close(file: Option<File>) -> Result<(), WriteError> {
        if let Some(mut file) = file {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl LogWriter for FileWriter {
    fn info(&self) -> WriterInfo {
        WriterInfo {
            name: "file",
            description: "writes log messages to files on local disk",
            retry_seconds: self.retry_seconds,
        }
    }

    async fn write(&self, category: &str, message: &str) -> Result<(), WriteError> {
        let mut state = self.state.lock().await;

        let name = self.target_name(&Local::now());
        if state.current_name != name && state.file.is_some() {
            info!(
                "rotating log file for [{}]: {} -> {name}",
                self.category, state.current_name
            );
            Self::sync_and_close(state.file.take()).await?;
        }
        state.current_name = name;

        if state.file.is_none() {
            let path = self.root.join(&state.current_name);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            debug!("opened log file {}", path.display());
            state.file = Some(file);
        }

        let line = self.format_record(category, message);
        if let Some(file) = state.file.as_mut() {
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), WriteError> {
        let mut state = self.state.lock().await;
        Self::sync_and_close(state.file.take()).await
    }
}
