//! Server Configuration
//!
//! Defaults plus a small hand-rolled command-line parser.

use crate::server::dispatcher::DispatcherConfig;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;
use thiserror::Error;

/// Errors produced while reading command-line arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Everything the server can be tuned with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Bound of the dispatcher's inbound and registration channels
    pub channel_capacity: usize,
    /// Bytes reserved for each socket read
    pub read_buffer_size: usize,
    /// Refuse new keys once the store holds this many
    pub max_keys: Option<usize>,
    /// Execute every command in a received chunk, not only the first
    pub pipelining: bool,
    /// First delay after a failed accept
    pub accept_backoff_initial: Duration,
    /// Ceiling for the accept retry delay
    pub accept_backoff_max: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            channel_capacity: 32,
            read_buffer_size: crate::connection::DEFAULT_READ_SIZE,
            max_keys: None,
            pipelining: false,
            accept_backoff_initial: Duration::from_millis(5),
            accept_backoff_max: Duration::from_secs(1),
        }
    }
}

/// What the binary should do after parsing its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(ServerConfig),
    Help,
    Version,
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            channel_capacity: self.channel_capacity,
            pipelining: self.pipelining,
        }
    }

    /// Parses command-line arguments, program name excluded.
    pub fn from_args<I>(args: I) -> Result<CliAction, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = ServerConfig::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" | "-h" => config.host = value_for(&arg, args.next())?,
                "--port" | "-p" => config.port = parse_value(&arg, args.next())?,
                "--channel-capacity" => {
                    config.channel_capacity = parse_value(&arg, args.next())?;
                    if config.channel_capacity == 0 {
                        return Err(ConfigError::InvalidValue {
                            flag: arg,
                            value: "0".to_string(),
                        });
                    }
                }
                "--read-buffer" => config.read_buffer_size = parse_value(&arg, args.next())?,
                "--max-keys" => config.max_keys = Some(parse_value(&arg, args.next())?),
                "--pipeline" => config.pipelining = true,
                "--help" => return Ok(CliAction::Help),
                "--version" | "-v" => return Ok(CliAction::Version),
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        Ok(CliAction::Run(config))
    }
}

fn value_for(flag: &str, value: Option<String>) -> Result<String, ConfigError> {
    value.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, ConfigError> {
    let value = value_for(flag, value)?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliAction, ConfigError> {
        ServerConfig::from_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:5001");
        assert!(!config.pipelining);
        assert_eq!(config.max_keys, None);
        assert_eq!(parse(&[]), Ok(CliAction::Run(config)));
    }

    #[test]
    fn test_flags() {
        let Ok(CliAction::Run(config)) = parse(&[
            "-h",
            "127.0.0.1",
            "--port",
            "6380",
            "--max-keys",
            "10",
            "--channel-capacity",
            "4",
            "--pipeline",
        ]) else {
            panic!("expected a run action");
        };

        assert_eq!(config.bind_address(), "127.0.0.1:6380");
        assert_eq!(config.max_keys, Some(10));
        assert_eq!(config.dispatcher_config().channel_capacity, 4);
        assert!(config.dispatcher_config().pipelining);
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["--help"]), Ok(CliAction::Help));
        assert_eq!(parse(&["-v"]), Ok(CliAction::Version));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse(&["--port"]),
            Err(ConfigError::MissingValue("--port".to_string()))
        );
        assert_eq!(
            parse(&["--port", "http"]),
            Err(ConfigError::InvalidValue {
                flag: "--port".to_string(),
                value: "http".to_string(),
            })
        );
        assert!(matches!(
            parse(&["--channel-capacity", "0"]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(
            parse(&["--verbose"]),
            Err(ConfigError::UnknownArgument("--verbose".to_string()))
        );
    }
}
