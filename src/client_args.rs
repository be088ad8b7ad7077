use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::ClientConfigFile;
use crate::service::ServiceOptions;

#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

static RUNTIME_FILE_SEQ: AtomicU64 = AtomicU64::new(0);

pub fn expand_tilde_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

// Keep file names portable whatever the tunnel or path label contains.
fn sanitize_label(label: &str) -> String {
    let name = Path::new(label)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "client".to_string()
    } else {
        cleaned
    }
}

/// A runtime config path under `dir` that no other instance of this process uses.
pub fn runtime_config_path(dir: &Path, label: &str) -> PathBuf {
    let seq = RUNTIME_FILE_SEQ.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(
        "{}-{}-{}.toml",
        sanitize_label(label),
        std::process::id(),
        seq
    ))
}

/// Render the validated config in the structured TOML format, whatever
/// format it was loaded from.
pub fn render_runtime_config(options: &ServiceOptions) -> Result<String, toml::ser::Error> {
    let mut file = ClientConfigFile {
        common: options.common.clone(),
        proxies: options.proxies.clone(),
        visitors: options.visitors.clone(),
    };
    // Unknown keys only survive lenient parsing; the client would reject them.
    file.common.extra.clear();
    for proxy in &mut file.proxies {
        proxy.extra.clear();
    }
    for visitor in &mut file.visitors {
        visitor.extra.clear();
    }
    toml::to_string(&file)
}

pub fn build_invocation(program: &str, runtime_config: &Path) -> Invocation {
    Invocation {
        program: expand_tilde_path(program).to_string_lossy().into_owned(),
        args: vec![
            "-c".to_string(),
            runtime_config.to_string_lossy().into_owned(),
        ],
    }
}
