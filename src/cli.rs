use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use liveproxy::config::{self, LaunchConfig, ServerConfig};
use liveproxy::logging::LogLevel;
use liveproxy::playlist::{PlaylistFormat, Rewrite};

/// Validate `--file-output` against the accepted playlist extensions.
fn validate_file_output(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if liveproxy::playlist::has_valid_extension(&path) {
        Ok(path)
    } else {
        Err(format!(
            "must end with one of {}",
            liveproxy::playlist::FILE_OUTPUT_LIST.join(" ")
        ))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "liveproxy",
    version,
    about = "Local URL proxy for streamlink, yt-dlp and youtube-dl",
    after_help = "Examples:\n  http://127.0.0.1:53422/play/?url=https://example.test/live&q=best\n  http://127.0.0.1:53422/base64/<urlsafe-base64 of a streamlink command>/"
)]
pub(crate) struct Cli {
    /// A fixed IPv4 address to listen on; also used for --file URLs
    #[arg(long, value_name = "HOST", default_value = config::DEFAULT_HOST, value_parser = config::ip_address)]
    pub host: Ipv4Addr,

    /// A fixed port to listen on; also used for --file URLs
    #[arg(long, value_name = "PORT", default_value_t = config::DEFAULT_PORT)]
    pub port: u16,

    /// Log level for LiveProxy and the tool's diagnostics
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Tool used when a request does not name one
    #[arg(long, value_name = "PROGRAM", default_value = config::DEFAULT_TOOL)]
    pub tool: String,

    /// Longest wait for a new connection before re-checking for shutdown (milliseconds)
    #[arg(long = "accept-timeout-ms", default_value_t = 500, value_parser = clap::value_parser!(u64).range(1..=60_000))]
    pub accept_timeout_ms: u64,

    /// Seconds allowed for a client to send its request
    #[arg(long = "request-timeout", default_value_t = 10)]
    pub request_timeout: u64,

    /// Milliseconds between SIGTERM and SIGKILL when stopping a tool
    #[arg(long = "grace-ms", default_value_t = 2000)]
    pub grace_ms: u64,

    /// Seconds allowed for 301 mode to print a stream URL
    #[arg(long = "resolve-timeout", default_value_t = 30)]
    pub resolve_timeout: u64,

    /// Seconds a blocked client write may take before the client counts as gone (0 = no limit)
    #[arg(long = "write-timeout", default_value_t = 0)]
    pub write_timeout: u64,

    /// Read FILE and write a copy with tool command lines replaced by LiveProxy URLs
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Output for --file instead of FILE.new
    #[arg(long = "file-output", value_name = "FILE", requires = "file", value_parser = validate_file_output)]
    pub file_output: Option<PathBuf>,

    /// URL style for --file; e2 suits Enigma2 userbouquets
    #[arg(long, value_enum, default_value_t = PlaylistFormat::M3u, requires = "file")]
    pub format: PlaylistFormat,
}

impl Cli {
    pub(crate) fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            accept_timeout: Duration::from_millis(self.accept_timeout_ms),
            request_timeout: Duration::from_secs(self.request_timeout.max(1)),
            write_timeout: (self.write_timeout > 0).then(|| Duration::from_secs(self.write_timeout)),
            launch: LaunchConfig {
                default_tool: self.tool.clone(),
                grace: Duration::from_millis(self.grace_ms),
                resolve_timeout: Duration::from_secs(self.resolve_timeout.max(1)),
                ..LaunchConfig::default()
            },
            ..ServerConfig::default()
        }
    }

    pub(crate) fn rewrite(&self) -> Option<Rewrite> {
        self.file.as_ref().map(|input| Rewrite {
            input: input.clone(),
            output: self.file_output.clone(),
            format: self.format,
            host: self.host,
            port: self.port,
        })
    }
}
