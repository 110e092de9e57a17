#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);
const POLL: Duration = Duration::from_millis(20);

fn log_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("turn-server-{}-{}", name, std::process::id()))
}

fn wait_for_log(path: &Path, line: &str) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if fs::read_to_string(path).is_ok_and(|log| log.contains(line)) {
            return true;
        }
        thread::sleep(POLL);
    }
    false
}

fn wait_for_exit(child: &mut Child) -> Option<ExitStatus> {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().expect("Can not wait for server") {
            return Some(status);
        }
        thread::sleep(POLL);
    }
    let _ = child.kill();
    None
}

#[test]
fn sigterm_stops_server() {
    let dir = log_dir("sigterm");
    // Created by the server
    let log = dir.join("logs").join("turn.log");
    let mut child = Command::new(env!("CARGO_BIN_EXE_turn-server"))
        .env("RUST_LOG", "info")
        .env("TURN_PUBLIC_IP", "127.0.0.1")
        .env("TURN_LISTEN_ADDR", "127.0.0.1")
        .env("TURN_PORT", "47050")
        .env("TURN_RELAY_MIN", "47051")
        .env("TURN_RELAY_MAX", "47059")
        .env("TURN_USER", "user")
        .env("TURN_PASS", "pass")
        .env("TURN_LOG_FILE", &log)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Can not start server");

    assert!(wait_for_log(&log, "TURN server listening on 127.0.0.1:47050"));

    let killed = Command::new("kill")
        .arg("-TERM")
        .arg(child.id().to_string())
        .status()
        .expect("Can not run kill");
    assert!(killed.success());

    let status = wait_for_exit(&mut child).expect("Server ignored SIGTERM");
    assert!(status.success());
    let contents = fs::read_to_string(&log).expect("Can not read log");
    assert!(contents.contains("Terminated"));
    assert!(contents.contains("Releasing 0 allocations"));

    let _ = fs::remove_dir_all(&dir);
}
