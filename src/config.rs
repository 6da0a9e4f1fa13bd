//! Configuration for the link, the session, and logging.
//!
//! Loaded from a TOML file whose sections are all optional:
//!
//! ```toml
//! [link]
//! host = "127.0.0.1"
//! port = 13854
//!
//! [session]
//! reset_on_reconnect = true
//!
//! [logging]
//! level = "info"
//! ```
//!
//! `THINKGEAR_HOST` and `THINKGEAR_PORT` override the file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::protocol::{DEFAULT_HOST, DEFAULT_MAX_LINE_BYTES, DEFAULT_PORT};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Sensor bridge endpoint and read-loop limits.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Address of the ThinkGear Connector.  Default: `"127.0.0.1"`.
    pub host: String,
    /// Port of the ThinkGear Connector.  Default: `13854`.
    pub port: u16,
    /// Capacity of the event channel between the read loop and the host.
    /// The loop waits when the host falls this far behind.  Default: `256`.
    pub channel_capacity: usize,
    /// Lines longer than this are dropped.  Default: 64 KiB.
    pub max_line_bytes: usize,
}

impl LinkConfig {
    /// `host:port` as passed to the socket connect.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            channel_capacity: 256,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Derived-state lifecycle policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Return score, level and meters to their defaults every time the link
    /// reconnects.  When `false`, progress carries over.  Default: `true`.
    pub reset_on_reconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reset_on_reconnect: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter (trace, debug, info, warn, error).  `RUST_LOG` wins.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `THINKGEAR_HOST` / `THINKGEAR_PORT` from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(
            std::env::var("THINKGEAR_HOST").ok(),
            std::env::var("THINKGEAR_PORT").ok(),
        )
    }

    fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) -> Result<()> {
        if let Some(host) = host {
            self.link.host = host;
        }
        if let Some(port) = port {
            self.link.port = port
                .parse()
                .with_context(|| format!("THINKGEAR_PORT is not a port number: {port:?}"))?;
        }
        Ok(())
    }
}

/// Parse `--config <path>` / `-c <path>` from command-line arguments.
///
/// Returns `None` when neither flag is given.
pub fn config_path_from_args<I: IntoIterator<Item = String>>(args: I) -> Option<String> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_owned());
        }
    }
    None
}

/// Resolve the configuration for a binary: file from the arguments (or
/// defaults), then environment overrides.
pub fn load_from_args() -> Result<AppConfig> {
    let mut config = match config_path_from_args(std::env::args().skip(1)) {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_bridge() {
        let config = AppConfig::default();
        assert_eq!(config.link.endpoint(), "127.0.0.1:13854");
        assert!(config.session.reset_on_reconnect);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = AppConfig::from_toml("[link]\nport = 4000\n").unwrap();
        assert_eq!(config.link.port, 4000);
        assert_eq!(config.link.host, "127.0.0.1");
        assert_eq!(config.link.channel_capacity, 256);
        assert!(config.session.reset_on_reconnect);
    }

    #[test]
    fn full_file() {
        let config = AppConfig::from_toml(
            r#"
            [link]
            host = "10.0.0.5"
            port = 13855
            channel_capacity = 32
            max_line_bytes = 4096

            [session]
            reset_on_reconnect = false

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.link.endpoint(), "10.0.0.5:13855");
        assert_eq!(config.link.max_line_bytes, 4096);
        assert!(!config.session.reset_on_reconnect);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn toml_round_trip() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(AppConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn rejects_bad_types() {
        assert!(AppConfig::from_toml("[link]\nport = \"high\"\n").is_err());
    }

    #[test]
    fn env_style_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(Some("192.168.1.20".into()), Some("9000".into()))
            .unwrap();
        assert_eq!(config.link.endpoint(), "192.168.1.20:9000");
        assert!(config.apply_overrides(None, Some("nope".into())).is_err());
    }

    #[test]
    fn config_flag_parsing() {
        let args = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(config_path_from_args(args(&["-c", "a.toml"])), Some("a.toml".into()));
        assert_eq!(
            config_path_from_args(args(&["--simulate", "--config", "b.toml"])),
            Some("b.toml".into())
        );
        assert_eq!(config_path_from_args(args(&["--config=c.toml"])), Some("c.toml".into()));
        assert_eq!(config_path_from_args(args(&["--simulate"])), None);
    }
}
