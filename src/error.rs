use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to read or decode one instance's configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid INI config at line {line}: {message}")]
    Ini { line: usize, message: String },
    #[error("unknown field '{field}' in {section}")]
    UnknownField { section: String, field: String },
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Failure to obtain tunnel definitions from the remote API.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to tunnel API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("tunnel API returned status {0}")]
    Status(u16),
    #[error("malformed tunnel API response: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("tunnel API response is missing field '{0}'")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("client service io error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to render runtime config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("client exited with code {code}")]
    Exited { code: i32 },
    #[error("client task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("client service is already running")]
    AlreadyRunning,
}

/// Why one instance did not launch or stopped with an error.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("config validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("{failed} of {total} client instance(s) failed")]
    InstancesFailed { failed: usize, total: usize },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to fetch tunnel configuration: {0}")]
    Fetch(#[from] FetchError),
    #[error("none of the requested tunnels exist")]
    NoTunnelsResolved,
    #[error(transparent)]
    Launch(#[from] LaunchError),
}
