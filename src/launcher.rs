use std::sync::{Arc, Once};

use crate::config;
use crate::error::LaunchError;
use crate::logging;
use crate::service::{ServiceFactory, ServiceOptions};
use crate::shutdown::ShutdownCoordinator;
use crate::source::ConfigSource;
use crate::validation;

static LEGACY_NOTICE: Once = Once::new();

/// Starts one client instance per call and runs it to completion.
pub struct Launcher {
    factory: Arc<dyn ServiceFactory>,
    coordinator: Arc<ShutdownCoordinator>,
    strict_config: bool,
}

impl Launcher {
    pub fn new(
        factory: Arc<dyn ServiceFactory>,
        coordinator: Arc<ShutdownCoordinator>,
        strict_config: bool,
    ) -> Self {
        Self {
            factory,
            coordinator,
            strict_config,
        }
    }

    /// Load, validate and build the instance behind `source`, then block
    /// until it stops. Load and validation errors are returned before
    /// anything is constructed.
    pub async fn launch(&self, source: &ConfigSource) -> Result<(), LaunchError> {
        let loaded = config::load(source, self.strict_config)?;
        if loaded.legacy_format {
            LEGACY_NOTICE.call_once(|| {
                tracing::warn!(
                    "the ini config format is deprecated and will be removed in a future release, \
                     please switch to yaml/json/toml"
                );
            });
        }

        match validation::validate(&loaded.common, &loaded.proxies, &loaded.visitors) {
            Ok(Some(warning)) => tracing::warn!(source = %source, "config warning: {warning}"),
            Ok(None) => {}
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = logging::apply(&loaded.common.log) {
            tracing::warn!(source = %source, log_to = %loaded.common.log.to, error = %e, "cannot open log sink, keeping current one");
        }

        let protocol = loaded.common.transport.protocol;
        let proxies = loaded.proxies.len();
        let visitors = loaded.visitors.len();
        let service = self.factory.build(ServiceOptions {
            label: source.label(),
            common: loaded.common,
            proxies: loaded.proxies,
            visitors: loaded.visitors,
        })?;

        // Capture termination signals only for transports that need a close handshake.
        let _registration = protocol
            .requires_graceful_close()
            .then(|| self.coordinator.register(source.clone(), Arc::clone(&service)));

        tracing::info!(source = %source, %protocol, proxies, visitors, "client service started");
        service.run().await?;
        Ok(())
    }
}
