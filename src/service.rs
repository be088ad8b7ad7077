use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::client_args::{build_invocation, render_runtime_config, runtime_config_path, Invocation};
use crate::config::{CommonConfig, ProxyConfig, VisitorConfig};
use crate::error::ServiceError;
use crate::runner::{run_client_with_pty, Control};

/// A running tunnel client instance.
#[async_trait]
pub trait ClientService: Send + Sync {
    /// Run until the instance stops.
    async fn run(&self) -> Result<(), ServiceError>;

    /// Ask the instance to close its session. Returns within `timeout`;
    /// only the first call has an effect.
    async fn graceful_close(&self, timeout: Duration);
}

pub trait ServiceFactory: Send + Sync {
    fn build(&self, options: ServiceOptions) -> Result<Arc<dyn ClientService>, ServiceError>;
}

/// Everything one instance is built from. Owned by that instance alone.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub label: String,
    pub common: CommonConfig,
    pub proxies: Vec<ProxyConfig>,
    pub visitors: Vec<VisitorConfig>,
}

/// Builds [`ProcessService`]s that run an external client program.
pub struct ProcessServiceFactory {
    program: String,
    runtime_dir: PathBuf,
}

impl ProcessServiceFactory {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            runtime_dir: std::env::temp_dir().join("tunnel-client"),
        }
    }

    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }
}

impl ServiceFactory for ProcessServiceFactory {
    fn build(&self, options: ServiceOptions) -> Result<Arc<dyn ClientService>, ServiceError> {
        fs::create_dir_all(&self.runtime_dir)?;
        let rendered = render_runtime_config(&options)?;
        let runtime_config = runtime_config_path(&self.runtime_dir, &options.label);
        fs::write(&runtime_config, rendered)?;

        let invocation = build_invocation(&self.program, &runtime_config);
        Ok(Arc::new(ProcessService::new(options.label, invocation, runtime_config)))
    }
}

/// Client instance backed by a child process attached to a pseudo-terminal.
pub struct ProcessService {
    label: String,
    invocation: Invocation,
    runtime_config: PathBuf,
    control_tx: mpsc::Sender<Control>,
    control_rx: Mutex<Option<mpsc::Receiver<Control>>>,
    exited: watch::Sender<bool>,
    closing: AtomicBool,
}

impl ProcessService {
    fn new(label: String, invocation: Invocation, runtime_config: PathBuf) -> Self {
        let (control_tx, control_rx) = mpsc::channel();
        let (exited, _) = watch::channel(false);
        Self {
            label,
            invocation,
            runtime_config,
            control_tx,
            control_rx: Mutex::new(Some(control_rx)),
            exited,
            closing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ClientService for ProcessService {
    async fn run(&self) -> Result<(), ServiceError> {
        let control_rx = self
            .control_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ServiceError::AlreadyRunning)?;

        tracing::info!(
            instance = %self.label,
            program = %self.invocation.program,
            "starting tunnel client"
        );

        let inv = self.invocation.clone();
        let label = self.label.clone();
        // PTY operations are blocking; run on a blocking task.
        let outcome =
            tokio::task::spawn_blocking(move || run_client_with_pty(&inv, &label, control_rx)).await;

        self.exited.send_replace(true);
        if let Err(e) = fs::remove_file(&self.runtime_config) {
            tracing::debug!(path = %self.runtime_config.display(), error = %e, "runtime config not removed");
        }

        let exit = outcome??;
        tracing::info!(instance = %self.label, code = exit.code, "tunnel client exited");
        if exit.code == 0 || exit.interrupted {
            Ok(())
        } else {
            Err(ServiceError::Exited { code: exit.code })
        }
    }

    async fn graceful_close(&self, timeout: Duration) {
        if *self.exited.borrow() || self.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.control_tx.send(Control::Interrupt);
        let mut exited = self.exited.subscribe();
        let stopped = match tokio::time::timeout(timeout, exited.wait_for(|done| *done)).await {
            Ok(result) => result.is_ok(),
            Err(_) => false,
        };

        if !stopped {
            tracing::warn!(instance = %self.label, ?timeout, "client did not close in time, killing it");
            let _ = self.control_tx.send(Control::Kill);
        }
    }
}
