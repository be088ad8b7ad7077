//! Shared fixtures for integration tests.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use tunnel_client::error::ServiceError;
use tunnel_client::service::{ClientService, ServiceFactory, ServiceOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    /// Runs until `graceful_close` is called.
    UntilClosed,
}

pub struct FakeService {
    behavior: Behavior,
    closed: Notify,
    pub closes: AtomicUsize,
}

#[async_trait]
impl ClientService for FakeService {
    async fn run(&self) -> Result<(), ServiceError> {
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(ServiceError::Exited { code: 1 }),
            Behavior::Panic => panic!("fake client crashed"),
            Behavior::UntilClosed => {
                self.closed.notified().await;
                Ok(())
            }
        }
    }

    async fn graceful_close(&self, _timeout: Duration) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.notify_one();
    }
}

type Chooser = Box<dyn Fn(&ServiceOptions) -> Behavior + Send + Sync>;

pub struct FakeFactory {
    choose: Chooser,
    built: Mutex<Vec<(String, Arc<FakeService>)>>,
}

#[allow(dead_code)]
impl FakeFactory {
    pub fn new(choose: impl Fn(&ServiceOptions) -> Behavior + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            choose: Box::new(choose),
            built: Mutex::new(Vec::new()),
        })
    }

    pub fn always(behavior: Behavior) -> Arc<Self> {
        Self::new(move |_| behavior)
    }

    pub fn built_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .built
            .lock()
            .unwrap()
            .iter()
            .map(|(label, _)| label.clone())
            .collect();
        labels.sort();
        labels
    }

    pub fn service(&self, label: &str) -> Option<Arc<FakeService>> {
        self.built
            .lock()
            .unwrap()
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, s)| s.clone())
    }

    /// Wait until `count` services were built.
    pub async fn wait_built(&self, count: usize) {
        for _ in 0..200 {
            if self.built.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count} services to be built");
    }
}

impl ServiceFactory for FakeFactory {
    fn build(&self, options: ServiceOptions) -> Result<Arc<dyn ClientService>, ServiceError> {
        let service = Arc::new(FakeService {
            behavior: (self.choose)(&options),
            closed: Notify::new(),
            closes: AtomicUsize::new(0),
        });
        self.built
            .lock()
            .unwrap()
            .push((options.label.clone(), service.clone()));
        Ok(service)
    }
}

/// A structured client config using `protocol` as transport.
pub fn client_config(protocol: &str) -> String {
    format!(
        "serverAddr = \"127.0.0.1\"\n\n\
         [auth]\ntoken = \"t\"\n\n\
         [transport]\nprotocol = \"{protocol}\"\n\n\
         [[proxies]]\nname = \"ssh\"\ntype = \"tcp\"\nlocalPort = 22\n"
    )
}

#[allow(dead_code)]
pub fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Tunnel API stand-in answering every request with a fixed response.
#[allow(dead_code)]
pub struct MockApi {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl MockApi {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

#[allow(dead_code)]
pub async fn start_mock_api(status: u16, body: String) -> MockApi {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let seen = seen.clone();
            let body = body.clone();
            tokio::spawn(async move {
                let request = read_request_body(&mut socket).await;
                seen.lock().unwrap().push(request);
                let reason = match status {
                    200 => "OK",
                    401 => "Unauthorized",
                    404 => "Not Found",
                    500 => "Internal Server Error",
                    _ => "Unknown",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockApi { addr, requests }
}

async fn read_request_body(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return String::new();
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let len = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let start = end + 4;
        if buf.len() >= start + len {
            return String::from_utf8_lossy(&buf[start..start + len]).into_owned();
        }
    }
}
