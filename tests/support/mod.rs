/*!
Test support helpers shared across integration tests.

- FakeTools: a temp directory of executable shell scripts named like the real tools
- start_server(): a LiveProxy server on an ephemeral port searching only that directory
- http_get()/split_response(): raw HTTP over TCP
- LogCapture: in-memory sink for a LogContext
- pid helpers to prove a tool was terminated and reaped
*/
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use liveproxy::config::{LaunchConfig, ServerConfig};
use liveproxy::logging::{LogContext, LogLevel};
use liveproxy::server::{Server, ServerHandle};

/// Fake `streamlink`: records its arguments and pid, answers `--stream-url`, streams three
/// chunks, or streams forever when one argument is `endless`; `fail` exits with no output.
pub const FAKE_STREAMLINK: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo $$ > "$dir/streamlink.pid"
: > "$dir/streamlink.args"
for a in "$@"; do printf '%s\n' "$a" >> "$dir/streamlink.args"; done
for a in "$@"; do
  if [ "$a" = "--stream-url" ]; then echo "https://cdn.example.test/live/index.m3u8"; exit 0; fi
done
for a in "$@"; do
  if [ "$a" = "fail" ]; then echo "error: No playable streams found on this URL" >&2; exit 1; fi
  if [ "$a" = "endless" ]; then
    echo "[cli][info] Opening stream: live (hls)" >&2
    while :; do printf 'media-bytes-media-bytes-media-bytes\n'; sleep 0.01; done
  fi
done
echo "[cli][info] Opening stream: worst (hls)" >&2
printf 'chunk-1;'
printf 'chunk-2;'
printf 'chunk-3'
"#;

/// Fake `yt-dlp`: records its arguments and writes a short payload.
pub const FAKE_YT_DLP: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo $$ > "$dir/yt-dlp.pid"
: > "$dir/yt-dlp.args"
for a in "$@"; do printf '%s\n' "$a" >> "$dir/yt-dlp.args"; done
printf 'downloaded-bytes'
"#;

/// A tool that must never be started; leaves a marker if it is.
pub const FAKE_CAT: &str = r#"#!/bin/sh
touch "$(dirname "$0")/cat.ran"
printf 'should-not-be-served'
"#;

pub struct FakeTools {
    dir: tempfile::TempDir,
}

impl FakeTools {
    pub fn new() -> Self {
        let tools = FakeTools {
            dir: tempfile::tempdir().expect("tempdir"),
        };
        tools.write_tool("streamlink", FAKE_STREAMLINK);
        tools.write_tool("yt-dlp", FAKE_YT_DLP);
        tools.write_tool("cat", FAKE_CAT);
        tools
    }

    /// Directory without any tools.
    pub fn empty() -> Self {
        FakeTools {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_tool(&self, name: &str, script: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, script).expect("write tool");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    /// Arguments recorded by the fake tool's last run.
    pub fn recorded_args(&self, tool: &str) -> Option<Vec<String>> {
        let text = std::fs::read_to_string(self.dir.path().join(format!("{tool}.args"))).ok()?;
        Some(text.lines().map(str::to_string).collect())
    }

    pub fn recorded_pid(&self, tool: &str) -> Option<i32> {
        std::fs::read_to_string(self.dir.path().join(format!("{tool}.pid")))
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    pub fn config(&self) -> ServerConfig {
        ServerConfig {
            port: 0,
            accept_timeout: Duration::from_millis(50),
            request_timeout: Duration::from_secs(5),
            launch: LaunchConfig {
                search_path: Some(self.dir.path().as_os_str().to_os_string()),
                grace: Duration::from_millis(500),
                resolve_timeout: Duration::from_secs(10),
                ..LaunchConfig::default()
            },
            ..ServerConfig::default()
        }
    }
}

pub fn start_server(config: ServerConfig, log: LogContext) -> ServerHandle {
    Server::bind(config, log)
        .expect("bind")
        .spawn()
        .expect("spawn server")
}

/// In-memory log sink.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    pub fn context(&self, level: LogLevel) -> LogContext {
        let sink = self.clone();
        LogContext::with_writer(level, move || sink.clone())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Poll until the log contains `needle` or `timeout` passes.
    pub fn wait_for(&self, needle: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.text().contains(needle) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        self.text().contains(needle)
    }
}

/// Send a GET for `target` and read until the server closes the connection.
pub fn http_get(port: u16, target: &str) -> Vec<u8> {
    http_send_raw(
        port,
        &format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nUser-Agent: liveproxy-test/1.0\r\n\r\n"),
    )
}

pub fn http_send_raw(port: u16, request: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect failed");
    stream
        .set_read_timeout(Some(Duration::from_secs(20)))
        .expect("read timeout");
    stream.write_all(request.as_bytes()).expect("write failed");
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf);
    buf
}

/// Split a raw response into (status, header text, body).
pub fn split_response(buf: &[u8]) -> (u16, String, Vec<u8>) {
    let end = liveproxy::util::find_header_end(buf).unwrap_or(buf.len());
    let head = String::from_utf8_lossy(&buf[..end]).into_owned();
    let status = head
        .lines()
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    (status, head, buf[end..].to_vec())
}

/// True while `pid` exists and is not a zombie. Orphaned helpers are reaped by whoever
/// inherits them, which may be slow inside containers.
pub fn process_alive(pid: i32) -> bool {
    if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rfind(')')
            .and_then(|i| stat[i + 1..].split_whitespace().next())
            .map_or(true, |state| state != "Z"),
        Err(_) => !Path::new("/proc/self").exists(),
    }
}

/// Poll until `pid` no longer exists (terminated and reaped).
pub fn wait_until_gone(pid: i32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    !process_alive(pid)
}

pub fn urlencode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}
