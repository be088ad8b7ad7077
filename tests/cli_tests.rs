//! Runs the built binary end to end.

#![cfg(unix)]

use std::fs;
use std::process::Command;

#[test]
fn fatal_error_reaches_stderr_when_logging_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let log_file = dir.path().join("client.log");
    let config = dir.path().join("frpc.toml");
    fs::write(
        &config,
        format!(
            "serverAddr = \"127.0.0.1\"\n\n\
             [log]\nto = \"{}\"\n\n\
             [[proxies]]\nname = \"ssh\"\ntype = \"tcp\"\nlocalPort = 22\n",
            log_file.display()
        ),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tunnel-client"))
        .arg("-c")
        .arg(&config)
        .args(["--client_bin", "false"])
        .env_remove("RUST_LOG")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("client exited with code 1"), "stderr: {stderr}");
    assert!(fs::read_to_string(&log_file).unwrap().contains("client exited with code 1"));
}
