//! Process-wide log setup.
//!
//! Logging starts on the console at `info` (or `RUST_LOG`). Each launched
//! instance then points the sink and level at what its own config asks for;
//! with several instances the last one to start wins.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::config::LogConfig;

static LOGGER: OnceLock<LogHandle> = OnceLock::new();

struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    sink: SharedSink,
}

#[derive(Default)]
enum Sink {
    #[default]
    Console,
    File(File),
}

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Sink>>);

impl SharedSink {
    fn lock(&self) -> MutexGuard<'_, Sink> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut *self.lock() {
            Sink::Console => io::stdout().write(buf),
            Sink::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut *self.lock() {
            Sink::Console => io::stdout().flush(),
            Sink::File(file) => file.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for SharedSink {
    type Writer = SharedSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init() {
    LOGGER.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let (filter, handle) = reload::Layer::new(filter);
        let sink = SharedSink::default();

        // Fails only when another subscriber is already installed (tests).
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).with_writer(sink.clone()))
            .try_init();

        LogHandle {
            filter: handle,
            sink,
        }
    });
}

/// Redirect logging to the sink and level of one instance's config.
/// `RUST_LOG`, when set, keeps control of the level.
pub fn apply(config: &LogConfig) -> io::Result<()> {
    init();
    let Some(handle) = LOGGER.get() else {
        return Ok(());
    };

    let sink = if config.to.is_empty() || config.to.eq_ignore_ascii_case("console") {
        Sink::Console
    } else {
        let path = shellexpand::tilde(&config.to).into_owned();
        Sink::File(OpenOptions::new().create(true).append(true).open(path)?)
    };
    *handle.sink.lock() = sink;

    if std::env::var_os("RUST_LOG").is_none() {
        let level = config.level.to_ascii_lowercase();
        if let Err(err) = handle.filter.reload(EnvFilter::new(level)) {
            tracing::debug!(error = %err, "failed to reload log filter");
        }
    }
    Ok(())
}
