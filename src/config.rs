//! Command-line configuration.
//!
//! ```text
//! respcache [--host HOST] [--port PORT] [--expiry POLICY] [--log-level FILTER]
//! ```

use crate::storage::ExpiryPolicy;
use crate::{DEFAULT_HOST, DEFAULT_PORT};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// What a due expiry record may delete
    pub expiry_policy: ExpiryPolicy,
    /// Log filter directive; `RUST_LOG` is used when unset
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            expiry_policy: ExpiryPolicy::default(),
            log_level: None,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Run(Config),
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid port number '{0}'")]
    InvalidPort(String),

    #[error("{0}")]
    InvalidExpiryPolicy(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Parses command-line arguments, excluding the program name.
pub fn parse_args<I>(args: I) -> Result<Invocation, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut config = Config::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--host" | "-h" => {
                config.host = args.next().ok_or(ConfigError::MissingValue(arg))?;
            }
            "--port" | "-p" => {
                let value = args.next().ok_or(ConfigError::MissingValue(arg))?;
                config.port = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort(value))?;
            }
            "--expiry" => {
                let value = args.next().ok_or(ConfigError::MissingValue(arg))?;
                config.expiry_policy = value.parse().map_err(ConfigError::InvalidExpiryPolicy)?;
            }
            "--log-level" => {
                config.log_level = Some(args.next().ok_or(ConfigError::MissingValue(arg))?);
            }
            "--help" => return Ok(Invocation::Help),
            "--version" | "-v" => return Ok(Invocation::Version),
            _ => return Err(ConfigError::UnknownArgument(arg)),
        }
    }

    Ok(Invocation::Run(config))
}

/// Usage text printed for `--help`.
pub fn help_text() -> String {
    format!(
        r#"
respcache - A minimal in-memory RESP key-value cache

USAGE:
    respcache [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Host to bind to (default: {host})
    -p, --port <PORT>          Port to listen on (default: {port})
        --expiry <POLICY>      generational or unconditional (default: generational)
        --log-level <FILTER>   Log filter, e.g. debug or respcache=trace (default: $RUST_LOG or info)
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    respcache                        # Start on {host}:{port}
    respcache --port 6380            # Start on port 6380
    respcache --host 127.0.0.1       # Listen on loopback only

CONNECTING:
    Use redis-cli or any RESP client to connect:
    $ redis-cli -p {port}
    127.0.0.1:{port}> SET name "Ariz" EX 60
    OK
    127.0.0.1:{port}> GET name
    "Ariz"
"#,
        host = DEFAULT_HOST,
        port = DEFAULT_PORT,
    )
}
