use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::{fmt, fs};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::legacy;
use crate::source::ConfigSource;

// Keys that did not match any known field; only inspected in strict mode.
type ExtraFields = BTreeMap<String, serde_json::Value>;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    #[default]
    Tcp,
    Kcp,
    Quic,
    Websocket,
    Wss,
}

impl TransportProtocol {
    /// Stateful transports that need an explicit close handshake instead of
    /// an abrupt disconnect when the process is asked to stop.
    pub fn requires_graceful_close(self) -> bool {
        matches!(self, TransportProtocol::Kcp | TransportProtocol::Quic)
    }
}

impl FromStr for TransportProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportProtocol::Tcp),
            "kcp" => Ok(TransportProtocol::Kcp),
            "quic" => Ok(TransportProtocol::Quic),
            "websocket" => Ok(TransportProtocol::Websocket),
            "wss" => Ok(TransportProtocol::Wss),
            other => Err(format!("unsupported transport protocol '{other}'")),
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Kcp => "kcp",
            TransportProtocol::Quic => "quic",
            TransportProtocol::Websocket => "websocket",
            TransportProtocol::Wss => "wss",
        };
        f.write_str(name)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthConfig {
    pub method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub token: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            method: "token".to_string(),
            token: String::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// "console" or a file path.
    pub to: String,
    pub level: String,
    pub max_days: i64,
    pub disable_print_color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            to: "console".to_string(),
            level: "info".to_string(),
            max_days: 3,
            disable_print_color: false,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct TransportConfig {
    pub protocol: TransportProtocol,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CommonConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    pub server_addr: String,
    pub server_port: u16,
    pub auth: AuthConfig,
    pub log: LogConfig,
    pub transport: TransportConfig,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            server_addr: "0.0.0.0".to_string(),
            server_port: 7000,
            auth: AuthConfig::default(),
            log: LogConfig::default(),
            transport: TransportConfig::default(),
            extra: ExtraFields::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub proxy_type: String,
    #[serde(rename = "localIP", default = "default_local_ip")]
    pub local_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitorConfig {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub visitor_type: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_key: String,
    #[serde(default = "default_local_ip")]
    pub bind_addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_port: Option<u16>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

pub(crate) fn default_local_ip() -> String {
    "127.0.0.1".to_string()
}

/// On-disk shape of the structured (non-legacy) format.
#[derive(Deserialize, Serialize, Debug, Default)]
pub(crate) struct ClientConfigFile {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxies: Vec<ProxyConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visitors: Vec<VisitorConfig>,
}

/// Configuration of one client instance, loaded independently per source.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub common: CommonConfig,
    pub proxies: Vec<ProxyConfig>,
    pub visitors: Vec<VisitorConfig>,
    pub legacy_format: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    LegacyIni,
    Toml,
    Yaml,
    Json,
}

pub fn detect_format(content: &str, path: Option<&Path>) -> ConfigFormat {
    if legacy::is_legacy_ini(content) {
        return ConfigFormat::LegacyIni;
    }
    let extension = path
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("toml") => ConfigFormat::Toml,
        Some("yaml") | Some("yml") => ConfigFormat::Yaml,
        Some("json") => ConfigFormat::Json,
        _ => sniff_format(content),
    }
}

// Inline payloads and unknown extensions carry no hint; look at the text.
fn sniff_format(content: &str) -> ConfigFormat {
    if content.trim_start().starts_with('{') {
        ConfigFormat::Json
    } else if toml::from_str::<toml::Table>(content).is_ok() {
        ConfigFormat::Toml
    } else {
        ConfigFormat::Yaml
    }
}

/// Load the configuration behind `source`. Inline content was already
/// fetched into memory and is never re-read from disk.
pub fn load(source: &ConfigSource, strict: bool) -> Result<LoadedConfig, ConfigError> {
    let (content, path) = match source {
        ConfigSource::FilePath(path) => {
            let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.clone(),
                source: e,
            })?;
            (Cow::Owned(content), Some(path.as_path()))
        }
        ConfigSource::InlineContent { content, .. } => (Cow::Borrowed(content.as_str()), None),
    };
    parse(&content, path, strict)
}

pub fn parse(content: &str, path: Option<&Path>, strict: bool) -> Result<LoadedConfig, ConfigError> {
    let file: ClientConfigFile = match detect_format(content, path) {
        ConfigFormat::LegacyIni => return legacy::parse(content),
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };

    if strict {
        reject_unknown("common", &file.common.extra)?;
        for proxy in &file.proxies {
            reject_unknown(&format!("proxy '{}'", proxy.name), &proxy.extra)?;
        }
        for visitor in &file.visitors {
            reject_unknown(&format!("visitor '{}'", visitor.name), &visitor.extra)?;
        }
    }

    Ok(LoadedConfig {
        common: file.common,
        proxies: file.proxies,
        visitors: file.visitors,
        legacy_format: false,
    })
}

fn reject_unknown(section: &str, extra: &ExtraFields) -> Result<(), ConfigError> {
    match extra.keys().next() {
        Some(field) => Err(ConfigError::UnknownField {
            section: section.to_string(),
            field: field.clone(),
        }),
        None => Ok(()),
    }
}
