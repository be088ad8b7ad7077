use std::fmt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::api::FetchedTunnels;

/// Where one instance's configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigSource {
    FilePath(PathBuf),
    /// Config text already held in memory, e.g. fetched from the tunnel API.
    InlineContent { content: String, label: String },
}

impl ConfigSource {
    pub fn label(&self) -> String {
        match self {
            ConfigSource::FilePath(path) => path.display().to_string(),
            ConfigSource::InlineContent { label, .. } => label.clone(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, ConfigSource::InlineContent { .. })
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::FilePath(path) => write!(f, "config file [{}]", path.display()),
            ConfigSource::InlineContent { label, .. } => write!(f, "tunnel [{label}]"),
        }
    }
}

/// Pick the fetched payload of every requested tunnel. Names missing from
/// the fetched set, or fetched without a usable payload, are reported and
/// skipped; requesting a name twice still yields a single source.
pub fn resolve_remote(requested: &[String], fetched: &FetchedTunnels) -> Vec<ConfigSource> {
    let mut sources: Vec<ConfigSource> = Vec::new();
    for name in requested {
        match fetched.get(name) {
            Some(Some(content)) => {
                let source = ConfigSource::InlineContent {
                    content: content.clone(),
                    label: name.clone(),
                };
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
            Some(None) => tracing::warn!(tunnel = %name, "tunnel has no usable config, skipping"),
            None => tracing::warn!(tunnel = %name, "tunnel does not exist"),
        }
    }
    sources
}

/// Every non-directory entry below `dir`. Unreadable entries are skipped.
pub fn resolve_directory(dir: &Path) -> Vec<ConfigSource> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable config dir entry");
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir())
        .map(|entry| ConfigSource::FilePath(entry.into_path()))
        .collect()
}
