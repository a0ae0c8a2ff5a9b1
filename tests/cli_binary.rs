#![cfg(unix)]
use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

fn liveproxy() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_liveproxy"));
    cmd.env_remove("LIVEPROXY_LOG");
    cmd
}

#[test]
fn test_help_lists_server_and_file_options() {
    let out = liveproxy().arg("--help").output().expect("run liveproxy");
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    for flag in ["--host", "--port", "--file", "--file-output", "--format", "--loglevel"] {
        assert!(text.contains(flag), "missing {flag} in help: {text}");
    }
}

#[test]
fn test_invalid_host_is_a_usage_error() {
    let out = liveproxy()
        .args(["--host", "not-an-ip"])
        .output()
        .expect("run liveproxy");
    assert_eq!(out.status.code(), Some(2));
}

#[cfg(target_os = "linux")]
#[test]
fn test_port_in_use_exits_with_errno() {
    let holder = TcpListener::bind(("127.0.0.1", 0)).expect("bind holder");
    let port = holder.local_addr().unwrap().port();
    let out = liveproxy()
        .args(["--port", &port.to_string(), "--loglevel", "info"])
        .output()
        .expect("run liveproxy");
    assert_eq!(out.status.code(), Some(nix::libc::EADDRINUSE));
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains(&format!("Could not listen on port {port}")), "{text}");
}

#[test]
fn test_file_mode_rewrites_playlist() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("channels.m3u");
    std::fs::write(
        &input,
        "#EXTM3U\n#EXTINF:-1,One\nstreamlink https://example.test/one best\n#EXTINF:-1,Two\nhttps://plain.test/two.ts\n",
    )
    .unwrap();
    let output = dir.path().join("channels.m3u8");

    let out = liveproxy()
        .arg("--file")
        .arg(&input)
        .arg("--file-output")
        .arg(&output)
        .args(["--host", "192.168.0.10", "--port", "8000"])
        .output()
        .expect("run liveproxy");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stdout));

    let text = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[2].starts_with("http://192.168.0.10:8000/base64/"), "{}", lines[2]);
    assert_eq!(lines[4], "https://plain.test/two.ts");
}

#[test]
fn test_file_mode_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = liveproxy()
        .arg("--file")
        .arg(dir.path().join("missing.m3u"))
        .output()
        .expect("run liveproxy");
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).contains("File does not exist"));
}

#[test]
fn test_sigint_stops_server_with_130() {
    let mut child = liveproxy()
        .args(["--port", "0", "--loglevel", "info"])
        .stdout(Stdio::piped())
        .spawn()
        .expect("run liveproxy");
    let stdout = child.stdout.take().unwrap();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut seen = Vec::new();
    loop {
        let line = rx
            .recv_timeout(Duration::from_secs(10))
            .unwrap_or_else(|_| panic!("server never listened: {seen:?}"));
        let listening = line.contains("Listening on http://127.0.0.1:");
        seen.push(line);
        if listening {
            break;
        }
    }

    kill(Pid::from_raw(child.id() as i32), Signal::SIGINT).unwrap();
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(130));
    while let Ok(line) = rx.recv_timeout(Duration::from_secs(2)) {
        seen.push(line);
    }
    let text = seen.join("\n");
    assert!(text.contains("Interrupted! Exiting..."), "{text}");
    assert!(text.contains("Closing server"), "{text}");
}
