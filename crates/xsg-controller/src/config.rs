//! Configuration management for xsg-controller
//!
//! Configuration is stored in TOML format.
//!
//! # Configuration File Locations
//!
//! - Linux: `~/.config/xsg/controller.toml`
//! - macOS: `~/Library/Application Support/io.xsg.xsg/controller.toml`
//! - Windows: `%APPDATA%\xsg\xsg\config\controller.toml`

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xsg_core::{AuthToken, SessionConfig};
use xsg_proto::CONSOLE_PORT;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Controller configuration
///
/// # Example TOML
///
/// ```toml
/// [console]
/// address = "192.168.1.50"
/// live_id = "FD00112233FFEE66"
///
/// [session]
/// discovery_attempts = 5
/// heartbeat_interval_ms = 3000
///
/// [output]
/// format = "table"
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub console: ConsoleConfig,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The console this controller talks to by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// IP address, or `ip:port`
    #[serde(default)]
    pub address: Option<String>,

    /// Device id from the console certificate; empty accepts any console
    /// answering at `address`
    #[serde(default)]
    pub live_id: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional pre-shared credentials sent in the connect request
    #[serde(default)]
    pub user_hash: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_port() -> u16 {
    CONSOLE_PORT
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            address: None,
            live_id: None,
            port: default_port(),
            user_hash: None,
            auth_token: None,
        }
    }
}

/// Session timing. Durations are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub discovery_attempts: u32,
    pub discovery_interval_ms: u64,
    pub connect_attempts: u32,
    pub connect_interval_ms: u64,
    pub auth_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_loss_intervals: u32,
    pub command_timeout_ms: u64,
    pub power_on_attempts: u32,
    pub power_on_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        let ms = |d: Duration| d.as_millis() as u64;
        Self {
            discovery_attempts: defaults.discovery_attempts,
            discovery_interval_ms: ms(defaults.discovery_interval),
            connect_attempts: defaults.connect_attempts,
            connect_interval_ms: ms(defaults.connect_interval),
            auth_timeout_ms: ms(defaults.auth_timeout),
            heartbeat_interval_ms: ms(defaults.heartbeat_interval),
            heartbeat_loss_intervals: defaults.heartbeat_loss_intervals,
            command_timeout_ms: ms(defaults.command_timeout),
            power_on_attempts: defaults.power_on_attempts,
            power_on_interval_ms: ms(defaults.power_on_interval),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "table", "json", "quiet"
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default)]
    pub verbose: bool,
}

fn default_format() -> String {
    "table".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            verbose: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive, e.g. "warn" or "xsg_core=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        match custom_path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "xsg", "xsg").map(|dirs| dirs.config_dir().join("controller.toml"))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        if let Some(path) = Self::default_path() {
            if !path.exists() {
                Self::default().save(&path)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_formats = ["table", "json", "quiet"];
        if !valid_formats.contains(&self.output.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid output format '{}'. Valid values: {:?}",
                self.output.format, valid_formats
            )));
        }

        if self.console.port == 0 {
            return Err(ConfigError::ValidationError("console port must be non-zero".into()));
        }
        if let Some(address) = &self.console.address {
            parse_console_address(address, self.console.port)?;
        }
        if self.console.user_hash.is_some() != self.console.auth_token.is_some() {
            return Err(ConfigError::ValidationError(
                "user_hash and auth_token must be set together".into(),
            ));
        }

        let s = &self.session;
        let counts = [
            ("discovery_attempts", s.discovery_attempts),
            ("connect_attempts", s.connect_attempts),
            ("heartbeat_loss_intervals", s.heartbeat_loss_intervals),
            ("power_on_attempts", s.power_on_attempts),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!("{name} must be greater than 0")));
            }
        }
        let durations = [
            ("discovery_interval_ms", s.discovery_interval_ms),
            ("connect_interval_ms", s.connect_interval_ms),
            ("auth_timeout_ms", s.auth_timeout_ms),
            ("heartbeat_interval_ms", s.heartbeat_interval_ms),
            ("command_timeout_ms", s.command_timeout_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }

    /// Session settings as the core expects them.
    pub fn session_config(&self) -> SessionConfig {
        let s = &self.session;
        let auth_token = match (&self.console.user_hash, &self.console.auth_token) {
            (Some(user_hash), Some(token)) => Some(AuthToken {
                user_hash: user_hash.clone(),
                token: token.clone(),
            }),
            _ => None,
        };
        SessionConfig {
            discovery_attempts: s.discovery_attempts,
            discovery_interval: Duration::from_millis(s.discovery_interval_ms),
            connect_attempts: s.connect_attempts,
            connect_interval: Duration::from_millis(s.connect_interval_ms),
            auth_timeout: Duration::from_millis(s.auth_timeout_ms),
            heartbeat_interval: Duration::from_millis(s.heartbeat_interval_ms),
            heartbeat_loss_intervals: s.heartbeat_loss_intervals,
            command_timeout: Duration::from_millis(s.command_timeout_ms),
            power_on_attempts: s.power_on_attempts,
            power_on_interval: Duration::from_millis(s.power_on_interval_ms),
            auth_token,
            ..SessionConfig::default()
        }
    }

    /// The configured console as a socket address, if any.
    pub fn console_address(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.console
            .address
            .as_deref()
            .map(|a| parse_console_address(a, self.console.port))
            .transpose()
    }

    pub fn sample_toml() -> &'static str {
        r#"# XSG Controller Configuration

[console]
# IP address of the console, optionally with a port
# address = "192.168.1.50"
# Device id (certificate common name); leave unset to accept any console at the address
# live_id = "FD00112233FFEE66"
port = 5050

[session]
discovery_attempts = 5
discovery_interval_ms = 1000
connect_attempts = 3
connect_interval_ms = 1000
auth_timeout_ms = 5000
heartbeat_interval_ms = 3000
heartbeat_loss_intervals = 3
command_timeout_ms = 5000
power_on_attempts = 5
power_on_interval_ms = 500

[output]
# Output format: "table", "json", "quiet"
format = "table"
verbose = false

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
level = "warn"
"#
    }
}

/// Parse `ip` or `ip:port`.
pub fn parse_console_address(value: &str, default_port: u16) -> Result<SocketAddr, ConfigError> {
    let value = value.trim();
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(addr);
    }
    value
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, default_port))
        .map_err(|_| ConfigError::ValidationError(format!("Invalid console address '{value}'")))
}

/// CLI flags that override config file values
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output_format: Option<String>,
    pub verbose: Option<bool>,
    pub debug: Option<bool>,
    pub address: Option<String>,
    pub live_id: Option<String>,
}

impl Config {
    /// Apply CLI overrides; CLI arguments take precedence over config file values.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref format) = overrides.output_format {
            self.output.format = format.clone();
        }
        if let Some(verbose) = overrides.verbose {
            self.output.verbose = verbose;
            if verbose && self.logging.level == default_log_level() {
                self.logging.level = "info".to_string();
            }
        }
        if overrides.debug == Some(true) {
            self.logging.level = "debug".to_string();
        }
        if let Some(ref address) = overrides.address {
            self.console.address = Some(address.clone());
        }
        if let Some(ref live_id) = overrides.live_id {
            self.console.live_id = Some(live_id.clone());
        }
        self
    }
}
