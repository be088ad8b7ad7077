//! Reader for the deprecated INI config format.
//!
//! `[common]` holds the client settings; every other section is a proxy, or a
//! visitor when it sets `role = visitor`. The section name becomes the
//! proxy/visitor name.

use std::fmt::Display;
use std::str::FromStr;

use crate::config::{default_local_ip, CommonConfig, LoadedConfig, ProxyConfig, VisitorConfig};
use crate::error::ConfigError;

pub(crate) fn is_legacy_ini(content: &str) -> bool {
    content.lines().any(|line| line.trim() == "[common]")
}

struct Entry {
    key: String,
    value: String,
    line: usize,
}

struct Section {
    name: String,
    entries: Vec<Entry>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }
}

fn ini_error(line: usize, message: impl Into<String>) -> ConfigError {
    ConfigError::Ini {
        line,
        message: message.into(),
    }
}

fn parse_sections(content: &str) -> Result<Vec<Section>, ConfigError> {
    let mut sections: Vec<Section> = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            let name = rest
                .strip_suffix(']')
                .ok_or_else(|| ini_error(line_no, "unterminated section header"))?
                .trim();
            if name.is_empty() {
                return Err(ini_error(line_no, "empty section name"));
            }
            sections.push(Section {
                name: name.to_string(),
                entries: Vec::new(),
            });
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ini_error(line_no, format!("expected 'key = value', got '{line}'")))?;
        let section = sections
            .last_mut()
            .ok_or_else(|| ini_error(line_no, "key outside of any section"))?;
        section.entries.push(Entry {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
            line: line_no,
        });
    }

    Ok(sections)
}

fn value<T>(entry: &Entry) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    entry
        .value
        .parse::<T>()
        .map_err(|e| ini_error(entry.line, format!("invalid value for '{}': {e}", entry.key)))
}

// The legacy format is never checked strictly; keys this reader does not
// model are dropped.
fn unknown(section: &Section, entry: &Entry) {
    tracing::debug!(section = %section.name, key = %entry.key, line = entry.line, "ignoring legacy config key");
}

fn apply_common(common: &mut CommonConfig, section: &Section) -> Result<(), ConfigError> {
    for entry in &section.entries {
        match entry.key.as_str() {
            "server_addr" => common.server_addr = entry.value.clone(),
            "server_port" => common.server_port = value(entry)?,
            "user" => common.user = entry.value.clone(),
            "token" => common.auth.token = entry.value.clone(),
            "authentication_method" => common.auth.method = entry.value.clone(),
            "protocol" => common.transport.protocol = value(entry)?,
            "log_file" => common.log.to = entry.value.clone(),
            "log_level" => common.log.level = entry.value.clone(),
            "log_max_days" => common.log.max_days = value(entry)?,
            "disable_log_color" => common.log.disable_print_color = value(entry)?,
            _ => unknown(section, entry),
        }
    }
    Ok(())
}

fn proxy_from(section: &Section) -> Result<ProxyConfig, ConfigError> {
    let mut proxy = ProxyConfig {
        name: section.name.clone(),
        proxy_type: "tcp".to_string(),
        local_ip: default_local_ip(),
        local_port: None,
        remote_port: None,
        custom_domains: Vec::new(),
        subdomain: None,
        extra: Default::default(),
    };
    for entry in &section.entries {
        match entry.key.as_str() {
            "type" => proxy.proxy_type = entry.value.clone(),
            "local_ip" => proxy.local_ip = entry.value.clone(),
            "local_port" => proxy.local_port = Some(value(entry)?),
            "remote_port" => proxy.remote_port = Some(value(entry)?),
            "custom_domains" => {
                proxy.custom_domains = entry
                    .value
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "subdomain" => proxy.subdomain = Some(entry.value.clone()),
            "role" => {}
            _ => unknown(section, entry),
        }
    }
    Ok(proxy)
}

fn visitor_from(section: &Section) -> Result<VisitorConfig, ConfigError> {
    let mut visitor = VisitorConfig {
        name: section.name.clone(),
        visitor_type: "stcp".to_string(),
        server_name: String::new(),
        secret_key: String::new(),
        bind_addr: default_local_ip(),
        bind_port: None,
        extra: Default::default(),
    };
    for entry in &section.entries {
        match entry.key.as_str() {
            "type" => visitor.visitor_type = entry.value.clone(),
            "server_name" => visitor.server_name = entry.value.clone(),
            "sk" => visitor.secret_key = entry.value.clone(),
            "bind_addr" => visitor.bind_addr = entry.value.clone(),
            "bind_port" => visitor.bind_port = Some(value(entry)?),
            "role" => {}
            _ => unknown(section, entry),
        }
    }
    Ok(visitor)
}

pub(crate) fn parse(content: &str) -> Result<LoadedConfig, ConfigError> {
    let mut common = CommonConfig::default();
    let mut proxies = Vec::new();
    let mut visitors = Vec::new();

    for section in parse_sections(content)? {
        if section.name == "common" {
            apply_common(&mut common, &section)?;
        } else if section.get("role") == Some("visitor") {
            visitors.push(visitor_from(&section)?);
        } else {
            proxies.push(proxy_from(&section)?);
        }
    }

    Ok(LoadedConfig {
        common,
        proxies,
        visitors,
        legacy_format: true,
    })
}
