//! Server configuration.
//!
//! Values come from three layers, later ones winning:
//!
//! 1. [`Config::default`]
//! 2. A `redis.conf`-style file: one `directive value` pair per line, `#`
//!    starts a comment, directive names are case-insensitive and unknown
//!    directives are ignored.
//! 3. Command-line flags.
//!
//! ```text
//! # redis.conf
//! bind 0.0.0.0
//! port 6380
//! databases 16
//! close-grace-period 10
//! shutdown-timeout 30
//! loglevel debug
//! ```

use crate::commands::handler::DEFAULT_DATABASES;
use crate::connection::DEFAULT_GRACE_PERIOD;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "redis.conf";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("{0}")]
    InvalidArgument(String),
}

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Host to bind to
    pub bind: String,
    /// Port to listen on
    pub port: u16,
    /// Number of logical databases `SELECT` accepts
    pub databases: usize,
    /// How long closing a connection waits for in-flight writes
    pub close_grace_period: Duration,
    /// Bound on the wait for connection tasks at shutdown (`None` waits forever)
    pub shutdown_timeout: Option<Duration>,
    /// Default log filter when `RUST_LOG` is unset
    pub loglevel: String,
    /// Answer every command with its own arguments
    pub echo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            databases: DEFAULT_DATABASES,
            close_grace_period: DEFAULT_GRACE_PERIOD,
            shutdown_timeout: None,
            loglevel: "info".to_string(),
            echo: false,
        }
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Start the server with this configuration
    Run(Config),
    /// Print usage and exit
    Help,
    /// Print the version and exit
    Version,
}

impl Config {
    /// Load configuration from a file on top of the defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (directive, value) = parse_line(line);
            config.apply_directive(&directive.to_lowercase(), value, line_num + 1)?;
        }

        Ok(config)
    }

    fn apply_directive(&mut self, directive: &str, value: &str, line: usize) -> Result<(), ConfigError> {
        match directive {
            "bind" => self.bind = value.to_string(),
            "port" => self.port = parse_number(value, line)?,
            "databases" => self.databases = parse_number(value, line)?,
            "close-grace-period" => {
                self.close_grace_period = Duration::from_secs(parse_number(value, line)?)
            }
            "shutdown-timeout" => {
                self.shutdown_timeout = match parse_number(value, line)? {
                    0 => None,
                    secs => Some(Duration::from_secs(secs)),
                }
            }
            "loglevel" => self.loglevel = value.to_lowercase(),
            "echo" => self.echo = parse_bool(value, line)?,
            // Directives for features this server does not have
            _ => {}
        }
        Ok(())
    }

    /// Resolves the full configuration from command-line arguments
    /// (without the program name).
    ///
    /// A `--config` file is loaded first and the remaining flags override
    /// it. Without `--config`, `redis.conf` in the working directory is used
    /// if present.
    pub fn from_args<I>(args: I) -> Result<Invocation, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();

        let mut config_path = None;
        let mut overrides: Vec<(&str, &str)> = Vec::new();
        let mut echo = false;

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--help" => return Ok(Invocation::Help),
                "--version" | "-v" => return Ok(Invocation::Version),
                "--echo" => echo = true,
                "--host" | "-h" | "--port" | "-p" | "--config" | "-c" => {
                    let value = args.get(i + 1).ok_or_else(|| {
                        ConfigError::InvalidArgument(format!("{} requires a value", flag))
                    })?;
                    if matches!(flag, "--config" | "-c") {
                        config_path = Some(PathBuf::from(value));
                    } else {
                        overrides.push((flag, value.as_str()));
                    }
                    i += 1;
                }
                other => {
                    return Err(ConfigError::InvalidArgument(format!(
                        "unknown argument: {}",
                        other
                    )))
                }
            }
            i += 1;
        }

        let mut config = match config_path {
            Some(path) => Config::load_from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Config::load_from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Config::default(),
        };

        for (flag, value) in overrides {
            match flag {
                "--host" | "-h" => config.bind = value.to_string(),
                _ => {
                    config.port = value.parse().map_err(|_| {
                        ConfigError::InvalidArgument(format!("invalid port number: {}", value))
                    })?
                }
            }
        }
        config.echo |= echo;

        Ok(Invocation::Run(config))
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Splits a config line into directive and value, unquoting the value.
fn parse_line(line: &str) -> (&str, &str) {
    let mut parts = line.splitn(2, char::is_whitespace);
    let directive = parts.next().unwrap_or("").trim();
    let value = parts.next().map(str::trim).unwrap_or("");

    let value = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    };

    (directive, value)
}

fn parse_number<T: std::str::FromStr>(value: &str, line: usize) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Parse {
        line,
        message: format!("invalid number: {}", value),
    })
}

fn parse_bool(value: &str, line: usize) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(ConfigError::Parse {
            line,
            message: format!("expected yes or no, got: {}", value),
        }),
    }
}
