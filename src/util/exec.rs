use std::ffi::OsString;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

/// Bounded command execution: captured output, own process group, hard timeout.
#[derive(Debug, Clone)]
pub struct ExecService {
    default_timeout: Duration,
}

impl ExecService {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn {:?} with args {:?}",
                request.program, request.args
            )
        })?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();
        let status = if timeout.is_zero() {
            child.wait().context("failed to wait for process")?
        } else {
            match child
                .wait_timeout(timeout)
                .context("failed to wait with timeout")?
            {
                Some(status) => status,
                None => {
                    kill_group(&mut child);
                    let _ = join(stdout);
                    let _ = join(stderr);
                    return Err(anyhow!(
                        "command {:?} timed out after {:?}",
                        request.program,
                        timeout
                    ));
                }
            }
        };

        // Leftover helpers in the group would hold the pipes open and stall the readers.
        let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);

        Ok(ExecOutput {
            status,
            duration: started.elapsed(),
            stdout: join(stdout)?,
            stderr: join(stderr)?,
        })
    }
}

impl Default for ExecService {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<std::io::Result<String>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join(handle: Option<JoinHandle<std::io::Result<String>>>) -> Result<String> {
    match handle {
        None => Ok(String::new()),
        Some(h) => h
            .join()
            .map_err(|_| anyhow!("output reader thread panicked"))?
            .context("failed to read process output"),
    }
}

fn kill_group(child: &mut Child) {
    let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    let _ = child.kill();
    let _ = child.wait();
}

#[derive(Debug, Default)]
pub struct ExecRequest {
    program: OsString,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl ExecRequest {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug)]
pub struct ExecOutput {
    pub status: std::process::ExitStatus,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}
