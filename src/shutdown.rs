//! Signal-driven graceful shutdown of instances on stateful transports.
//!
//! ```text
//! Running --signal--> ShutdownRequested --> Draining --all closed--> Terminated
//! ```
//!
//! Only instances that registered (see `TransportProtocol::requires_graceful_close`)
//! are drained; everything else is left to its own run loop or to process exit.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;

use crate::service::ClientService;
use crate::source::ConfigSource;

pub const GRACEFUL_CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Exit code used when a second termination signal arrives.
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShutdownRequested,
    Draining,
    Terminated,
}

struct Inner {
    state: ShutdownState,
    handles: HashMap<ConfigSource, Arc<dyn ClientService>>,
    watching_signals: bool,
}

pub struct ShutdownCoordinator {
    inner: Mutex<Inner>,
    close_timeout: Duration,
}

/// Keeps a handle registered until dropped.
#[must_use = "the handle is unregistered when the registration is dropped"]
pub struct Registration {
    coordinator: Arc<ShutdownCoordinator>,
    source: ConfigSource,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.coordinator.lock().handles.remove(&self.source);
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Arc<Self> {
        Self::with_timeout(GRACEFUL_CLOSE_TIMEOUT)
    }

    pub fn with_timeout(close_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: ShutdownState::Running,
                handles: HashMap::new(),
                watching_signals: false,
            }),
            close_timeout,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ShutdownState {
        self.lock().state
    }

    pub fn registered(&self) -> usize {
        self.lock().handles.len()
    }

    /// Register a drain-capable handle. The first registration installs the
    /// signal handlers, before this call returns. A handle registered after
    /// shutdown began is closed right away.
    pub fn register(self: &Arc<Self>, source: ConfigSource, service: Arc<dyn ClientService>) -> Registration {
        let mut inner = self.lock();
        if inner.state == ShutdownState::Running {
            inner.handles.insert(source.clone(), service);
            if !inner.watching_signals {
                inner.watching_signals = true;
                match TermSignals::install() {
                    Ok(signals) => {
                        tokio::spawn(watch_signals(Arc::clone(self), signals));
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to install signal handlers"),
                }
            }
        } else {
            drop(inner);
            let timeout = self.close_timeout;
            let late = source.clone();
            tokio::spawn(async move { close_bounded(late, service, timeout).await });
        }

        Registration {
            coordinator: Arc::clone(self),
            source,
        }
    }

    /// Close every registered handle, each bounded by the close timeout.
    /// Only the first call drains; later calls return immediately.
    pub async fn shutdown(&self) {
        let handles: Vec<(ConfigSource, Arc<dyn ClientService>)> = {
            let mut inner = self.lock();
            if inner.state != ShutdownState::Running {
                return;
            }
            inner.state = ShutdownState::ShutdownRequested;
            let handles = inner
                .handles
                .iter()
                .map(|(source, service)| (source.clone(), Arc::clone(service)))
                .collect();
            inner.state = ShutdownState::Draining;
            handles
        };

        tracing::info!(instances = handles.len(), "draining client instances");
        let mut drains = JoinSet::new();
        for (source, service) in handles {
            drains.spawn(close_bounded(source, service, self.close_timeout));
        }
        while drains.join_next().await.is_some() {}

        self.lock().state = ShutdownState::Terminated;
        tracing::info!("drain complete");
    }
}

async fn close_bounded(source: ConfigSource, service: Arc<dyn ClientService>, timeout: Duration) {
    if tokio::time::timeout(timeout, service.graceful_close(timeout))
        .await
        .is_err()
    {
        tracing::warn!(source = %source, ?timeout, "graceful close timed out");
    }
}

async fn watch_signals(coordinator: Arc<ShutdownCoordinator>, mut signals: TermSignals) {
    signals.recv().await;
    tracing::info!("termination signal received");

    // Our handlers replaced the default action; a second signal exits.
    tokio::spawn(async move {
        signals.recv().await;
        tracing::warn!("second termination signal received, exiting");
        std::process::exit(FORCED_EXIT_CODE);
    });

    coordinator.shutdown().await;
}

#[cfg(unix)]
struct TermSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl TermSignals {
    fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
    }
}

#[cfg(not(unix))]
struct TermSignals;

#[cfg(not(unix))]
impl TermSignals {
    fn install() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct Stubborn {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl ClientService for Stubborn {
        async fn run(&self) -> Result<(), ServiceError> {
            Ok(())
        }

        // Ignores its own timeout entirely.
        async fn graceful_close(&self, _timeout: Duration) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }

    fn source(name: &str) -> ConfigSource {
        ConfigSource::FilePath(name.into())
    }

    #[tokio::test]
    async fn drain_is_bounded_by_timeout() {
        let coordinator = ShutdownCoordinator::with_timeout(Duration::from_millis(50));
        let a = Arc::new(Stubborn { closes: AtomicUsize::new(0) });
        let b = Arc::new(Stubborn { closes: AtomicUsize::new(0) });
        let _ra = coordinator.register(source("a"), a.clone());
        let _rb = coordinator.register(source("b"), b.clone());
        assert_eq!(coordinator.registered(), 2);

        let started = Instant::now();
        coordinator.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
    }

    #[tokio::test]
    async fn shutdown_runs_once() {
        let coordinator = ShutdownCoordinator::with_timeout(Duration::from_millis(10));
        let a = Arc::new(Stubborn { closes: AtomicUsize::new(0) });
        let _ra = coordinator.register(source("a"), a.clone());

        coordinator.shutdown().await;
        coordinator.shutdown().await;
        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_registration_unregisters() {
        let coordinator = ShutdownCoordinator::new();
        let a = Arc::new(Stubborn { closes: AtomicUsize::new(0) });
        let registration = coordinator.register(source("a"), a.clone());
        assert_eq!(coordinator.registered(), 1);
        drop(registration);
        assert_eq!(coordinator.registered(), 0);

        coordinator.shutdown().await;
        assert_eq!(a.closes.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
    }

    #[tokio::test]
    async fn late_registration_is_closed_immediately() {
        let coordinator = ShutdownCoordinator::with_timeout(Duration::from_millis(10));
        coordinator.shutdown().await;

        let late = Arc::new(Stubborn { closes: AtomicUsize::new(0) });
        let _r = coordinator.register(source("late"), late.clone());
        assert_eq!(coordinator.registered(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(late.closes.load(Ordering::SeqCst), 1);
    }
}
