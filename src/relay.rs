//! Pump a running tool's stdout to the HTTP client and its stderr to the log.
//!
//! One thread, one `poll(2)` over both pipes; the client write is blocking so a slow
//! viewer throttles the tool through its pipe buffer. Every exit path ends with the
//! process terminated and reaped.
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::process::{ChildStderr, ChildStdout};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::errors::is_disconnect;
use crate::launcher::{exit_code, ProcessHandle};
use crate::server::http::write_stream_prelude;
use crate::util::split_complete_lines;

/// Longest stderr fragment held back while waiting for a newline.
const MAX_PENDING_LOG: usize = 16 * 1024;

/// How long a tool with closed pipes may linger before it is terminated.
const EXIT_WAIT: Duration = Duration::from_secs(2);

/// Lifecycle of one relay; always ends in `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Tool started, nothing sent to the client yet.
    Starting,
    /// Headers sent; forwarding stdout.
    Streaming,
    /// Tool exited; reading what is left in the pipes.
    Draining,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Tool finished and every byte reached the client.
    Completed { exit_code: i32 },
    /// Tool exited without writing any media; nothing was sent to the client.
    NoOutput { exit_code: i32 },
    ClientDisconnected,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub chunk_size: usize,
    /// Upper bound on one poll; the exit check runs at least this often.
    pub poll_interval: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            chunk_size: 8192,
            poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub outcome: RelayOutcome,
    pub state: RelayState,
    /// Every state the relay passed through, in order, starting with `Starting`.
    pub transitions: Vec<RelayState>,
    pub bytes_sent: u64,
    pub log_lines: u64,
}

enum Flow {
    Data,
    Eof,
    Done(RelayOutcome),
}

struct Relay<'a, W: Write> {
    client: &'a mut W,
    state: RelayState,
    transitions: Vec<RelayState>,
    headers_sent: bool,
    bytes_sent: u64,
    stderr_buf: Vec<u8>,
    log_lines: u64,
}

/// Stream `process` to `client` until the tool exits or the client goes away.
///
/// Response headers are written together with the first stdout chunk, so a tool that
/// fails before producing media leaves the client untouched (`RelayOutcome::NoOutput`).
pub fn relay<W: Write>(
    process: &mut ProcessHandle,
    client: &mut W,
    options: &RelayOptions,
) -> RelayReport {
    let mut relay = Relay {
        client,
        state: RelayState::Starting,
        transitions: vec![RelayState::Starting],
        headers_sent: false,
        bytes_sent: 0,
        stderr_buf: Vec::new(),
        log_lines: 0,
    };
    let outcome = relay.run(process, options);
    relay.flush_log_tail();

    // Disconnects and failures drain too: nothing more is read, the tool is stopped.
    relay.enter(RelayState::Draining);
    let status = process.terminate();
    relay.enter(RelayState::Terminated);
    let outcome = match outcome {
        RelayOutcome::Completed { .. } | RelayOutcome::NoOutput { .. } => {
            let code = status.map(exit_code).unwrap_or(1);
            if relay.bytes_sent == 0 {
                RelayOutcome::NoOutput { exit_code: code }
            } else {
                RelayOutcome::Completed { exit_code: code }
            }
        }
        other => other,
    };
    RelayReport {
        outcome,
        state: relay.state,
        transitions: relay.transitions,
        bytes_sent: relay.bytes_sent,
        log_lines: relay.log_lines,
    }
}

impl<W: Write> Relay<'_, W> {
    fn run(&mut self, process: &mut ProcessHandle, options: &RelayOptions) -> RelayOutcome {
        let mut stdout = process.take_stdout();
        let mut stderr = process.take_stderr();
        let mut chunk = vec![0u8; options.chunk_size.max(1)];
        let timeout_ms = options.poll_interval.as_millis().min(u16::MAX as u128) as u16;

        loop {
            if stdout.is_none() && stderr.is_none() {
                return match wait_for_exit(process, options.poll_interval) {
                    Ok(()) => RelayOutcome::Completed { exit_code: 0 },
                    Err(e) => RelayOutcome::Failed(format!("wait failed: {e}")),
                };
            }

            let (out_ready, err_ready) = match wait_readable(&stdout, &stderr, timeout_ms) {
                Ok(ready) => ready,
                Err(Errno::EINTR) => continue,
                Err(e) => return RelayOutcome::Failed(format!("poll failed: {e}")),
            };

            // Pipes still held open by a leftover grandchild must not keep us here forever.
            if self.state == RelayState::Draining && !out_ready && !err_ready {
                return RelayOutcome::Completed { exit_code: 0 };
            }

            if out_ready {
                if let Some(pipe) = stdout.as_mut() {
                    match self.forward_stdout(pipe, &mut chunk) {
                        Flow::Data => {}
                        Flow::Eof => stdout = None,
                        Flow::Done(outcome) => return outcome,
                    }
                }
            }
            if err_ready {
                if let Some(pipe) = stderr.as_mut() {
                    match pipe.read(&mut chunk) {
                        Ok(0) => stderr = None,
                        Ok(n) => self.log_stderr(&chunk[..n]),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            tracing::debug!("reading tool stderr failed: {}", e);
                            stderr = None;
                        }
                    }
                }
            }

            if process.status().is_none() {
                match process.try_wait() {
                    Ok(Some(status)) => {
                        tracing::debug!("tool exited with code {}", exit_code(status));
                        self.enter(RelayState::Draining);
                    }
                    Ok(None) => {}
                    Err(e) => return RelayOutcome::Failed(format!("wait failed: {e}")),
                }
            }
        }
    }

    fn forward_stdout(&mut self, pipe: &mut ChildStdout, chunk: &mut [u8]) -> Flow {
        let n = match pipe.read(chunk) {
            Ok(0) => return Flow::Eof,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Flow::Data,
            Err(e) => {
                return Flow::Done(RelayOutcome::Failed(format!(
                    "reading tool output failed: {e}"
                )))
            }
        };

        if !self.headers_sent {
            if let Err(e) = write_stream_prelude(&mut *self.client) {
                return Flow::Done(client_error(e));
            }
            self.headers_sent = true;
            if self.state == RelayState::Starting {
                self.enter(RelayState::Streaming);
            }
        }
        if let Err(e) = self
            .client
            .write_all(&chunk[..n])
            .and_then(|_| self.client.flush())
        {
            return Flow::Done(client_error(e));
        }
        self.bytes_sent += n as u64;
        Flow::Data
    }

    fn enter(&mut self, state: RelayState) {
        if self.state != state {
            self.state = state;
            self.transitions.push(state);
        }
    }

    fn log_stderr(&mut self, bytes: &[u8]) {
        let mut buf = std::mem::take(&mut self.stderr_buf);
        buf.extend_from_slice(bytes);
        let (complete, rest) = split_complete_lines(&buf);
        for line in complete.split(|b| *b == b'\n') {
            self.log_line(line);
        }
        self.stderr_buf = rest.to_vec();
        if self.stderr_buf.len() > MAX_PENDING_LOG {
            self.flush_log_tail();
        }
    }

    fn log_line(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches('\r');
        if text.trim().is_empty() {
            return;
        }
        self.log_lines += 1;
        tracing::info!(target: "liveproxy::tool", "{}", text);
    }

    fn flush_log_tail(&mut self) {
        let tail = std::mem::take(&mut self.stderr_buf);
        self.log_line(&tail);
    }
}

fn client_error(e: io::Error) -> RelayOutcome {
    if is_disconnect(&e) || matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
    {
        tracing::info!("Detected remote disconnect ({})", e);
        RelayOutcome::ClientDisconnected
    } else {
        tracing::error!("writing to client failed: {}", e);
        RelayOutcome::Failed(format!("writing to client failed: {e}"))
    }
}

fn wait_readable(
    stdout: &Option<ChildStdout>,
    stderr: &Option<ChildStderr>,
    timeout_ms: u16,
) -> nix::Result<(bool, bool)> {
    let mut fds = Vec::with_capacity(2);
    let out_idx = stdout.as_ref().map(|p| {
        fds.push(PollFd::new(p.as_fd(), PollFlags::POLLIN));
        fds.len() - 1
    });
    let err_idx = stderr.as_ref().map(|p| {
        fds.push(PollFd::new(p.as_fd(), PollFlags::POLLIN));
        fds.len() - 1
    });

    if poll(&mut fds, PollTimeout::from(timeout_ms))? == 0 {
        return Ok((false, false));
    }
    let wake = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
    let ready = |idx: Option<usize>| {
        idx.and_then(|i| fds[i].revents())
            .map(|r| r.intersects(wake))
            .unwrap_or(false)
    };
    Ok((ready(out_idx), ready(err_idx)))
}

/// Give a tool that closed both pipes a moment to exit on its own; `terminate` handles the rest.
fn wait_for_exit(process: &mut ProcessHandle, interval: Duration) -> io::Result<()> {
    let deadline = Instant::now() + EXIT_WAIT;
    while process.try_wait()?.is_none() && Instant::now() < deadline {
        std::thread::sleep(interval.min(Duration::from_millis(50)));
    }
    Ok(())
}
