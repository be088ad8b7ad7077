use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};

use crate::error::{LaunchError, ServiceError, SupervisorError};
use crate::launcher::Launcher;
use crate::source::ConfigSource;

/// Pause between successive launches so instances do not all hit the
/// server at the same instant.
pub const DEFAULT_LAUNCH_STAGGER: Duration = Duration::from_millis(1);

/// Outcome of one instance.
#[derive(Debug)]
pub struct LaunchResult {
    pub source: ConfigSource,
    pub error: Option<LaunchError>,
}

impl LaunchResult {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

// Start one task per source and wait for all of them. A failing or
// panicking instance never affects its siblings.
pub async fn run_all(
    launcher: Arc<Launcher>,
    sources: Vec<ConfigSource>,
    stagger: Duration,
) -> Vec<LaunchResult> {
    let mut join_set = JoinSet::new();
    let mut in_flight = HashMap::new();

    for (i, source) in sources.into_iter().enumerate() {
        if i > 0 && !stagger.is_zero() {
            sleep(stagger).await;
        }
        let launcher = Arc::clone(&launcher);
        let task_source = source.clone();
        let handle = join_set.spawn(async move { launcher.launch(&task_source).await });
        in_flight.insert(handle.id(), source);
    }

    let mut results = Vec::with_capacity(in_flight.len());
    while let Some(joined) = join_set.join_next_with_id().await {
        let (id, error) = match joined {
            Ok((id, outcome)) => (id, outcome.err()),
            Err(e) => (e.id(), Some(LaunchError::Service(ServiceError::Join(e)))),
        };
        let Some(source) = in_flight.remove(&id) else {
            continue;
        };

        match &error {
            Some(e) => tracing::error!(source = %source, error = %e, "client service failed"),
            None => tracing::info!(source = %source, "client service stopped"),
        }
        results.push(LaunchResult { source, error });
    }
    results
}

/// Run every source to completion. The error only says that at least one
/// instance failed; per-source details are in the log.
pub async fn supervise_all(
    launcher: Arc<Launcher>,
    sources: Vec<ConfigSource>,
    stagger: Duration,
) -> Result<(), SupervisorError> {
    let total = sources.len();
    let results = run_all(launcher, sources, stagger).await;
    let failed = results.iter().filter(|r| r.is_failure()).count();
    if failed == 0 {
        Ok(())
    } else {
        Err(SupervisorError::InstancesFailed { failed, total })
    }
}
