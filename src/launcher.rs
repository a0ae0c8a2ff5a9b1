//! Resolve, classify and start the wrapped tool; own its lifecycle until it is reaped.
use std::ffi::OsStr;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;

use crate::config::LaunchConfig;
use crate::decoder::ArgumentList;
use crate::errors::ProxyError;
use crate::util::exec::{ExecRequest, ExecService};

/// Supported tool families. Anything else is refused before launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Streamlink,
    /// youtube-dl and its forks.
    Downloader,
}

/// What the tool is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Write media to stdout.
    Play,
    /// Print the direct stream URL and exit.
    Resolve,
}

impl ToolKind {
    /// Classify by executable name (case-insensitive, `.exe` ignored).
    pub fn classify(path: &Path) -> Option<ToolKind> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        let stem = name.strip_suffix(".exe").unwrap_or(&name);
        match stem {
            "streamlink" => Some(ToolKind::Streamlink),
            "youtube-dl" | "youtube_dl" | "yt-dlp" | "yt_dlp" => Some(ToolKind::Downloader),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolKind::Streamlink => "streamlink",
            ToolKind::Downloader => "downloader",
        }
    }

    /// Flags appended after the request's own arguments.
    pub fn forced_flags(self, mode: LaunchMode) -> &'static [&'static str] {
        match (self, mode) {
            (ToolKind::Streamlink, LaunchMode::Play) => &["--stdout", "--loglevel", "none"],
            (ToolKind::Streamlink, LaunchMode::Resolve) => &[
                "--stream-types",
                "hls,http",
                "--stream-url",
                "--loglevel",
                "none",
            ],
            (ToolKind::Downloader, LaunchMode::Play) => &[
                "-o",
                "-",
                "--quiet",
                "--no-playlist",
                "--no-warnings",
                "--no-progress",
            ],
            (ToolKind::Downloader, LaunchMode::Resolve) => {
                &["--get-url", "--quiet", "--no-playlist", "--no-warnings"]
            }
        }
    }
}

/// A fully resolved command, ready to spawn.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub kind: ToolKind,
    pub mode: LaunchMode,
    pub executable: PathBuf,
    pub args: Vec<String>,
}

impl LaunchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LaunchMode::Play => "play",
            LaunchMode::Resolve => "resolve",
        }
    }
}

impl LaunchPlan {
    pub fn display_name(&self) -> String {
        self.executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.executable.display().to_string())
    }
}

/// Locate an executable by name on the configured search path (or `PATH`).
pub fn find_executable(program: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    match search_path {
        Some(paths) => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
            which::which_in(program, Some(paths), cwd).ok()
        }
        None => which::which(program).ok(),
    }
}

/// Resolve and classify the program, then append the kind's forced flags.
pub fn plan(
    list: &ArgumentList,
    mode: LaunchMode,
    config: &LaunchConfig,
) -> Result<LaunchPlan, ProxyError> {
    let program = list.program.as_deref().unwrap_or(&config.default_tool);
    let executable = find_executable(program, config.search_path.as_deref())
        .ok_or_else(|| ProxyError::ExecutableNotFound(program.to_string()))?;
    let kind = ToolKind::classify(&executable).ok_or_else(|| ProxyError::UnsupportedTool {
        program: program.to_string(),
        path: executable.display().to_string(),
    })?;

    let mut args = list.args.clone();
    args.extend(kind.forced_flags(mode).iter().map(|s| s.to_string()));
    Ok(LaunchPlan {
        kind,
        mode,
        executable,
        args,
    })
}

/// Start the tool with three piped streams in its own process group.
pub fn spawn(plan: &LaunchPlan, grace: Duration) -> Result<ProcessHandle, ProxyError> {
    let mut child = Command::new(&plan.executable)
        .args(&plan.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|source| ProxyError::Spawn {
            program: plan.display_name(),
            source,
        })?;
    Ok(ProcessHandle {
        pid: child.id(),
        stdin: child.stdin.take(),
        stdout: child.stdout.take(),
        stderr: child.stderr.take(),
        child,
        status: None,
        grace,
    })
}

/// Run the tool in resolve mode and return the first URL it prints.
pub fn resolve_url(plan: &LaunchPlan, timeout: Duration) -> Result<String, ProxyError> {
    let output = ExecService::default()
        .run(
            ExecRequest::new(&plan.executable)
                .args(&plan.args)
                .timeout(timeout),
        )
        .map_err(|e| ProxyError::Resolve(format!("{e:#}")))?;
    tracing::debug!(
        "{} answered in {:?} with {}",
        plan.display_name(),
        output.duration,
        output.status
    );
    for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
        tracing::info!(target: "liveproxy::tool", "{}", line.trim_end());
    }
    if !output.status.success() {
        return Err(ProxyError::Resolve(format!(
            "{} exited with {}",
            plan.display_name(),
            output.status
        )));
    }
    output
        .stdout
        .lines()
        .map(str::trim)
        .find(|l| l.contains("://"))
        .map(str::to_string)
        .ok_or_else(|| ProxyError::Resolve(format!("{} printed no url", plan.display_name())))
}

/// Exclusive owner of one running tool. Dropping it terminates and reaps the process.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    status: Option<ExitStatus>,
    grace: Duration,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Non-blocking exit check; caches the status once the child is reaped.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        if self.status.is_none() {
            self.status = self.child.try_wait()?;
        }
        Ok(self.status)
    }

    /// Close our pipe ends, SIGTERM the group, SIGKILL after the grace period, reap.
    ///
    /// The group is signalled even when the tool itself already exited: helpers it
    /// started (a muxer, a backgrounded job) share its process group and must not
    /// outlive the request.
    pub fn terminate(&mut self) -> Option<ExitStatus> {
        self.stdin.take();
        self.stdout.take();
        self.stderr.take();

        let group = Pid::from_raw(self.pid as i32);
        signal_group(group, Signal::SIGTERM);
        let deadline = Instant::now() + self.grace;
        loop {
            let reaped = match self.try_wait() {
                Ok(status) => status.is_some(),
                Err(_) => break,
            };
            if reaped && !group_alive(group) {
                return self.status;
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        tracing::debug!("process group {} ignored SIGTERM, sending SIGKILL", self.pid);
        signal_group(group, Signal::SIGKILL);
        if self.status.is_none() {
            let _ = self.child.kill();
            if let Ok(status) = self.child.wait() {
                self.status = Some(status);
            }
        }
        self.status
    }
}

fn signal_group(group: Pid, signal: Signal) {
    match killpg(group, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::debug!("{} to process group {} failed: {}", signal, group, e),
    }
}

/// True while any member of `group` still exists. Zombies awaiting their new parent count
/// as gone: they hold no pipes and run no code.
fn group_alive(group: Pid) -> bool {
    if killpg(group, None) == Err(Errno::ESRCH) {
        return false;
    }
    #[cfg(target_os = "linux")]
    {
        !group_is_zombies_only(group)
    }
    #[cfg(not(target_os = "linux"))]
    {
        true
    }
}

#[cfg(target_os = "linux")]
fn group_is_zombies_only(group: Pid) -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return false;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|n| n.parse::<i32>().ok()) else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            continue;
        };
        // Fields after the parenthesised command: state ppid pgrp ...
        let Some(rest) = stat.rfind(')').map(|i| &stat[i + 1..]) else {
            continue;
        };
        let mut fields = rest.split_whitespace();
        let state = fields.next();
        let pgrp = fields.nth(1).and_then(|f| f.parse::<i32>().ok());
        if pgrp == Some(group.as_raw()) && state != Some("Z") {
            return false;
        }
    }
    true
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Map an exit status to a shell-style code (128 + signal when killed).
pub fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(code) = status.code() {
        code
    } else if let Some(signal) = status.signal() {
        128 + signal
    } else {
        1
    }
}
