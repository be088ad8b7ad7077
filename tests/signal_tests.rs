//! Delivers a real termination signal to the test process. Kept in its own
//! binary so no other test shares the process-wide signal handlers.

#![cfg(unix)]

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tunnel_client::error::ServiceError;
use tunnel_client::service::ClientService;
use tunnel_client::shutdown::{ShutdownCoordinator, ShutdownState};
use tunnel_client::ConfigSource;

struct SlowToClose {
    closes: AtomicUsize,
}

#[async_trait]
impl ClientService for SlowToClose {
    async fn run(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn graceful_close(&self, _timeout: Duration) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
}

#[tokio::test]
async fn sigterm_drains_registered_instances_once() {
    let coordinator = ShutdownCoordinator::with_timeout(Duration::from_millis(100));
    let first = Arc::new(SlowToClose { closes: AtomicUsize::new(0) });
    let second = Arc::new(SlowToClose { closes: AtomicUsize::new(0) });
    let _r1 = coordinator.register(ConfigSource::FilePath(PathBuf::from("a.toml")), first.clone());
    let _r2 = coordinator.register(ConfigSource::FilePath(PathBuf::from("b.toml")), second.clone());
    assert_eq!(coordinator.state(), ShutdownState::Running);

    // Only one signal: a second one exits the process.
    let status = Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    for _ in 0..300 {
        if coordinator.state() == ShutdownState::Terminated {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(coordinator.state(), ShutdownState::Terminated);
    assert_eq!(first.closes.load(Ordering::SeqCst), 1);
    assert_eq!(second.closes.load(Ordering::SeqCst), 1);
}
