pub mod api;
pub mod cli;
pub mod client_args;
pub mod config;
pub mod error;
pub mod launcher;
pub mod legacy;
pub mod logging;
pub mod runner;
pub mod service;
pub mod shutdown;
pub mod source;
pub mod supervisor;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

pub use cli::{Cli, Mode, Settings};
pub use error::AppError;
pub use source::ConfigSource;

use crate::api::TunnelApi;
use crate::launcher::Launcher;
use crate::service::{ProcessServiceFactory, ServiceFactory};
use crate::shutdown::ShutdownCoordinator;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn run(settings: Settings) -> Result<(), AppError> {
    let factory = Arc::new(ProcessServiceFactory::new(settings.client_bin.clone()));
    run_with_factory(settings, factory).await
}

/// Resolve the config sources of `settings` and run one instance per source.
///
/// Single-file mode returns the instance's error. In directory and tunnel
/// mode instance failures are logged and do not fail the run; a failed
/// tunnel fetch, or no requested tunnel existing, does.
pub async fn run_with_factory(settings: Settings, factory: Arc<dyn ServiceFactory>) -> Result<(), AppError> {
    let coordinator = ShutdownCoordinator::new();
    let launcher = Arc::new(Launcher::new(factory, coordinator, settings.strict_config));

    match settings.mode {
        Mode::Single(path) => {
            launcher.launch(&ConfigSource::FilePath(path)).await?;
            Ok(())
        }
        Mode::Directory(dir) => {
            let sources = source::resolve_directory(&dir);
            if sources.is_empty() {
                tracing::warn!(dir = %dir.display(), "no config files found");
                return Ok(());
            }
            run_multiple(launcher, sources, settings.launch_stagger).await;
            Ok(())
        }
        Mode::Remote { token, tunnels } => {
            tracing::info!("fetching tunnel configuration");
            let api = TunnelApi::new(settings.api_url)?;
            let fetched = api.fetch_tunnels(&token).await?;
            let sources = source::resolve_remote(&tunnels, &fetched);
            if sources.is_empty() {
                return Err(AppError::NoTunnelsResolved);
            }
            run_multiple(launcher, sources, settings.launch_stagger).await;
            Ok(())
        }
    }
}

async fn run_multiple(launcher: Arc<Launcher>, sources: Vec<ConfigSource>, stagger: Duration) {
    tracing::info!(instances = sources.len(), "starting client instances");
    if let Err(e) = supervisor::supervise_all(launcher, sources, stagger).await {
        tracing::warn!(error = %e, "some client instances failed");
    }
}
