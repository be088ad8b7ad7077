use std::io::{Read, Write};
use std::sync::mpsc;
use std::time::Duration;
use std::{io, thread};

use portable_pty::{CommandBuilder, PtySize};

use crate::client_args::Invocation;

// Terminal interrupt character; the PTY line discipline turns it into SIGINT
// for the client, which then runs its own close handshake.
const INTERRUPT: u8 = 0x03;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    /// Ask the client to close its session.
    Interrupt,
    Kill,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ClientExit {
    pub(crate) code: i32,
    /// A close was requested before the client exited.
    pub(crate) interrupted: bool,
}

// Split complete lines off the front of `pending`, leaving any partial line.
pub(crate) fn drain_lines(pending: &mut String) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = pending.find('\n') {
        let line: String = pending.drain(..=pos).collect();
        let line = line.trim_end_matches(['\r', '\n']);
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

fn forward_output(label: &str, pending: &mut String) {
    for line in drain_lines(pending) {
        tracing::info!(target: "client", instance = label, "{line}");
    }
}

fn flush_output(label: &str, pending: &mut String) {
    forward_output(label, pending);
    let rest = pending.trim();
    if !rest.is_empty() {
        tracing::info!(target: "client", instance = label, "{rest}");
    }
    pending.clear();
}

// The client sees the slave side as its terminal; we drive the master side:
// its output is forwarded into our log, and control requests are written to
// it (interrupt) or applied to the child directly (kill).
pub(crate) fn run_client_with_pty(
    inv: &Invocation,
    label: &str,
    control_rx: mpsc::Receiver<Control>,
) -> io::Result<ClientExit> {
    let pty_system = portable_pty::native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 160,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| io::Error::other(format!("openpty failed: {e}")))?;

    let mut cmd = CommandBuilder::new(&inv.program);
    cmd.args(&inv.args);

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| io::Error::other(format!("spawn {} in pty failed: {e}", inv.program)))?;
    // The child keeps the slave open until it exits.
    drop(pair.slave);

    let mut reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| io::Error::other(format!("pty reader failed: {e}")))?;
    let mut writer = pair
        .master
        .take_writer()
        .map_err(|e| io::Error::other(format!("pty writer failed: {e}")))?;

    // portable-pty uses blocking I/O; read PTY output on a dedicated thread and forward via mpsc.
    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>();
    let reader_handle = thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if out_tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut pending = String::new();
    let mut interrupted = false;

    loop {
        match control_rx.try_recv() {
            Ok(Control::Interrupt) => {
                interrupted = true;
                if let Err(e) = writer.write_all(&[INTERRUPT]).and_then(|_| writer.flush()) {
                    tracing::warn!(instance = label, error = %e, "failed to interrupt client, killing it");
                    let _ = child.kill();
                }
            }
            Ok(Control::Kill) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader_handle.join();
                flush_output(label, &mut pending);
                return Ok(ClientExit {
                    code: 1,
                    interrupted: true,
                });
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => {}
        }

        match out_rx.recv_timeout(POLL_INTERVAL) {
            Ok(chunk) => {
                pending.push_str(&String::from_utf8_lossy(&chunk));
                forward_output(label, &mut pending);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        // Poll for process exit without blocking control handling.
        if let Ok(Some(status)) = child.try_wait() {
            let _ = reader_handle.join();
            while let Ok(chunk) = out_rx.try_recv() {
                pending.push_str(&String::from_utf8_lossy(&chunk));
            }
            flush_output(label, &mut pending);
            return Ok(ClientExit {
                code: status.exit_code() as i32,
                interrupted,
            });
        }
    }

    let status = child
        .wait()
        .map_err(|e| io::Error::other(format!("wait failed: {e}")))?;
    let _ = reader_handle.join();
    flush_output(label, &mut pending);
    Ok(ClientExit {
        code: status.exit_code() as i32,
        interrupted,
    })
}
