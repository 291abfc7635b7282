//! YAML configuration for the agent.
//!
//! Loaded through figment so defaults, the config file, and future providers
//! merge cleanly. Validation happens once at load time; anything invalid is a
//! [`ConfigError`] and the process refuses to start.
//!
//! ```yaml
//! max_write_threads: 128
//! server:
//!   http: { host: 127.0.0.1, port: 8070 }
//!   udp:  { host: 127.0.0.1, port: 8070, workers: 4 }
//!   tcp:  { host: 127.0.0.1, port: 8090 }
//! log:
//!   default: { type: file, root: ./log, file_pattern: "%Y%m%d.log", format: json }
//!   audit:   { type: forward, destination: "http://10.0.0.2:8070", retry_seconds: -1 }
//!   fan:     { type: fanout, targets: "default, audit" }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::providers::{Format, Yaml};
use figment::Figment;
use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_MAX_WRITE_THREADS: usize = 128;
const DEFAULT_UDP_WORKERS: usize = 4;

/// Retry budget applied when a writer does not advertise one, in seconds.
pub const DEFAULT_RETRY_SECONDS: i64 = 60;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on concurrent in-flight writer calls.
    max_write_threads: usize,
    pub server: ServerConfig,
    /// One writer per category. The `default` category is mandatory.
    pub log: HashMap<String, WriterConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http: ListenerConfig,
    pub udp: UdpListenerConfig,
    pub tcp: ListenerConfig,
}

/// A TCP-based listener. Port 0 (the default) disables it.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }
}

impl ListenerConfig {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.port > 0
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UdpListenerConfig {
    pub host: String,
    pub port: u16,
    workers: usize,
}

impl Default for UdpListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            workers: DEFAULT_UDP_WORKERS,
        }
    }
}

impl UdpListenerConfig {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.port > 0
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        if self.workers == 0 {
            DEFAULT_UDP_WORKERS
        } else {
            self.workers
        }
    }
}

/// Per-category writer declaration, dispatched on the `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WriterConfig {
    File(FileWriterConfig),
    Forward(ForwardWriterConfig),
    Fanout(FanoutWriterConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileWriterConfig {
    /// Root directory for log files, created if missing.
    #[serde(default = "default_file_root")]
    pub root: PathBuf,
    /// strftime pattern for the file name; rotation happens whenever the
    /// evaluated pattern changes.
    pub file_pattern: String,
    /// `tsv` or `json`; anything else falls back to `json`.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub retry_seconds: Option<i64>,
}

fn default_file_root() -> PathBuf {
    PathBuf::from("./log")
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForwardWriterConfig {
    /// `udp://`, `tcp://`, `http://` or `https://` destination.
    pub destination: String,
    #[serde(default)]
    pub retry_seconds: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FanoutWriterConfig {
    /// Target categories, separated by commas, semicolons or whitespace.
    pub targets: String,
}

impl Config {
    /// Loads and validates the configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Load(format!(
                "configuration file [{}] does not exist",
                path.display()
            )));
        }
        let config: Config = Figment::new()
            .merge(Yaml::file(path))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a YAML string. Used by tests.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = Figment::new()
            .merge(Yaml::string(yaml))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.log.is_empty() {
            return Err(ConfigError::NoWriters);
        }
        if !self.log.keys().any(|cat| cat.trim().eq_ignore_ascii_case("default")) {
            return Err(ConfigError::MissingDefault);
        }
        Ok(())
    }

    #[must_use]
    pub fn max_write_threads(&self) -> usize {
        if self.max_write_threads == 0 {
            DEFAULT_MAX_WRITE_THREADS
        } else {
            self.max_write_threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = Config::from_yaml(
            r#"
log:
  default: { type: file, file_pattern: "%Y%m%d.log" }
"#,
        )
        .unwrap();

        assert_eq!(config.max_write_threads(), 128);
        assert!(!config.server.http.enabled());
        assert!(!config.server.udp.enabled());
        assert_eq!(config.server.udp.workers(), 4);
        assert!(matches!(config.log["default"], WriterConfig::File(_)));
    }

    #[test]
    fn full_config_parses() {
        let config = Config::from_yaml(
            r#"
max_write_threads: 16
server:
  http: { host: 0.0.0.0, port: 8070 }
  udp:  { port: 8071, workers: 2 }
  tcp:  { port: 8090 }
log:
  default:
    type: file
    root: /var/log/relay
    file_pattern: "%Y-%m-%d.log"
    format: tsv
    retry_seconds: 10
  audit:
    type: forward
    destination: "http://10.0.0.2:8070"
    retry_seconds: -1
  fan:
    type: fanout
    targets: "default, audit"
"#,
        )
        .unwrap();

        assert_eq!(config.max_write_threads(), 16);
        assert_eq!(config.server.http.bind_addr(), "0.0.0.0:8070");
        assert_eq!(config.server.udp.workers(), 2);
        assert!(config.server.tcp.enabled());
        assert_eq!(config.log.len(), 3);
        match &config.log["audit"] {
            WriterConfig::Forward(forward) => {
                assert_eq!(forward.destination, "http://10.0.0.2:8070");
                assert_eq!(forward.retry_seconds, Some(-1));
            }
            other => panic!("expected forward writer, got {other:?}"),
        }
    }

    #[test]
    fn missing_default_category_is_fatal() {
        let err = Config::from_yaml(
            r#"
log:
  app: { type: file, file_pattern: "%Y%m%d.log" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingDefault));
    }

    #[test]
    fn empty_writer_map_is_fatal() {
        let err = Config::from_yaml("max_write_threads: 4\n").unwrap_err();
        assert!(matches!(err, ConfigError::NoWriters));
    }

    #[test]
    fn unknown_writer_type_is_a_load_error() {
        let err = Config::from_yaml(
            r#"
log:
  default: { type: carrier-pigeon }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn zero_max_write_threads_falls_back_to_default() {
        let config = Config::from_yaml(
            r#"
max_write_threads: 0
log:
  default: { type: file, file_pattern: "x.log" }
"#,
        )
        .unwrap();
        assert_eq!(config.max_write_threads(), 128);
    }
}
