use std::collections::HashSet;
use std::fmt;

use crate::config::{CommonConfig, ProxyConfig, VisitorConfig};
use crate::error::ValidationError;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const PROXY_TYPES: [&str; 8] = ["tcp", "udp", "http", "https", "tcpmux", "stcp", "sudp", "xtcp"];
const VISITOR_TYPES: [&str; 3] = ["stcp", "sudp", "xtcp"];

/// Non-fatal findings; the instance still starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning(pub Vec<String>);

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

fn invalid(message: impl Into<String>) -> ValidationError {
    ValidationError(message.into())
}

pub fn validate(
    common: &CommonConfig,
    proxies: &[ProxyConfig],
    visitors: &[VisitorConfig],
) -> Result<Option<Warning>, ValidationError> {
    let mut warnings = Vec::new();

    validate_common(common, &mut warnings)?;

    if proxies.is_empty() && visitors.is_empty() {
        warnings.push("no proxies or visitors are configured".to_string());
    }

    let mut names = HashSet::new();
    for proxy in proxies {
        validate_proxy(proxy)?;
        if !names.insert(proxy.name.as_str()) {
            return Err(invalid(format!("duplicate proxy name '{}'", proxy.name)));
        }
    }

    let mut names = HashSet::new();
    for visitor in visitors {
        validate_visitor(visitor)?;
        if !names.insert(visitor.name.as_str()) {
            return Err(invalid(format!("duplicate visitor name '{}'", visitor.name)));
        }
    }

    Ok((!warnings.is_empty()).then_some(Warning(warnings)))
}

fn validate_common(common: &CommonConfig, warnings: &mut Vec<String>) -> Result<(), ValidationError> {
    if common.server_addr.trim().is_empty() {
        return Err(invalid("serverAddr must not be empty"));
    }
    if common.server_port == 0 {
        return Err(invalid("serverPort must be between 1 and 65535"));
    }
    if common.auth.method != "token" {
        return Err(invalid(format!(
            "unsupported auth method '{}', only 'token' is supported",
            common.auth.method
        )));
    }
    if common.auth.token.is_empty() {
        warnings.push("auth token is empty".to_string());
    }
    if !LOG_LEVELS.contains(&common.log.level.to_ascii_lowercase().as_str()) {
        return Err(invalid(format!(
            "invalid log level '{}', expected one of {}",
            common.log.level,
            LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

fn validate_proxy(proxy: &ProxyConfig) -> Result<(), ValidationError> {
    if proxy.name.trim().is_empty() {
        return Err(invalid("proxy name must not be empty"));
    }
    if !PROXY_TYPES.contains(&proxy.proxy_type.as_str()) {
        return Err(invalid(format!(
            "proxy '{}': unknown type '{}'",
            proxy.name, proxy.proxy_type
        )));
    }
    match proxy.proxy_type.as_str() {
        "http" | "https" => {
            if proxy.custom_domains.is_empty() && proxy.subdomain.is_none() {
                return Err(invalid(format!(
                    "proxy '{}': customDomains or subdomain is required for {} proxies",
                    proxy.name, proxy.proxy_type
                )));
            }
        }
        "tcp" | "udp" => {
            if proxy.local_port.is_none() {
                return Err(invalid(format!("proxy '{}': localPort is required", proxy.name)));
            }
        }
        _ => {}
    }
    Ok(())
}

fn validate_visitor(visitor: &VisitorConfig) -> Result<(), ValidationError> {
    if visitor.name.trim().is_empty() {
        return Err(invalid("visitor name must not be empty"));
    }
    if !VISITOR_TYPES.contains(&visitor.visitor_type.as_str()) {
        return Err(invalid(format!(
            "visitor '{}': unknown type '{}'",
            visitor.name, visitor.visitor_type
        )));
    }
    if visitor.server_name.is_empty() {
        return Err(invalid(format!("visitor '{}': serverName is required", visitor.name)));
    }
    if visitor.bind_port.is_none() {
        return Err(invalid(format!("visitor '{}': bindPort is required", visitor.name)));
    }
    Ok(())
}
