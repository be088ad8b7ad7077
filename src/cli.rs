use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::api::DEFAULT_API_URL;
use crate::client_args::expand_tilde_path;
use crate::supervisor::DEFAULT_LAUNCH_STAGGER;

#[derive(Parser, Debug)]
#[command(
    name = "tunnel-client",
    about = "Start tunnel client instances from local config files or tunnels fetched with a token",
    disable_version_flag = true
)]
pub struct Cli {
    /// Config file of the tunnels to start
    #[arg(short = 'c', long = "config", default_value = "./frpc.ini")]
    pub config: String,

    /// Directory of config files; one client instance per file (testing only)
    #[arg(long = "config_dir", alias = "config-dir")]
    pub config_dir: Option<String>,

    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// Treat unknown config fields as errors
    #[arg(
        long = "strict_config",
        alias = "strict-config",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true"
    )]
    pub strict_config: bool,

    /// Token used to fetch tunnel configs from the tunnel API
    #[arg(short = 'u', long = "token")]
    pub token: Option<String>,

    /// Names of the tunnels to start, comma separated
    #[arg(short = 't', long = "tunnel", value_delimiter = ',')]
    pub tunnels: Vec<String>,

    #[arg(long = "api_url", alias = "api-url", default_value = DEFAULT_API_URL, hide = true)]
    pub api_url: String,

    /// Tunnel client program run for each instance
    #[arg(long = "client_bin", alias = "client-bin", default_value = "frpc")]
    pub client_bin: String,

    #[arg(
        long = "launch_stagger_ms",
        alias = "launch-stagger-ms",
        default_value_t = DEFAULT_LAUNCH_STAGGER.as_millis() as u64,
        hide = true
    )]
    pub launch_stagger_ms: u64,
}

/// Where the instances of this invocation come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Remote { token: String, tunnels: Vec<String> },
    Directory(PathBuf),
    Single(PathBuf),
}

/// Immutable run settings, built once from the command line.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: Mode,
    pub strict_config: bool,
    pub api_url: String,
    pub client_bin: String,
    pub launch_stagger: Duration,
}

impl Cli {
    pub fn into_settings(self) -> Settings {
        let tunnels: Vec<String> = self
            .tunnels
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let token = self.token.filter(|t| !t.is_empty());

        let mode = match (token, self.config_dir) {
            (Some(token), _) if !tunnels.is_empty() => Mode::Remote { token, tunnels },
            (_, Some(dir)) if !dir.is_empty() => Mode::Directory(expand_tilde_path(&dir)),
            _ => Mode::Single(expand_tilde_path(&self.config)),
        };

        Settings {
            mode,
            strict_config: self.strict_config,
            api_url: self.api_url,
            client_bin: self.client_bin,
            launch_stagger: Duration::from_millis(self.launch_stagger_ms),
        }
    }
}
