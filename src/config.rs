//! Explicit runtime configuration handed to the server at construction.
use std::ffi::OsString;
use std::net::Ipv4Addr;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 53422;
pub const DEFAULT_TOOL: &str = "streamlink";

/// How a request's tool gets found and started.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Program used when the request does not name one.
    pub default_tool: String,
    /// Directories searched for the program; `None` means `PATH`.
    pub search_path: Option<OsString>,
    /// Time between SIGTERM and SIGKILL when tearing a tool down.
    pub grace: Duration,
    /// Upper bound for 301 mode, where the tool only prints a URL.
    pub resolve_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            default_tool: DEFAULT_TOOL.to_string(),
            search_path: None,
            grace: Duration::from_secs(2),
            resolve_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
    /// Longest the accept loop waits before re-checking the shutdown flag.
    pub accept_timeout: Duration,
    /// Read timeout for the request head.
    pub request_timeout: Duration,
    /// Write timeout for the response body; `None` waits for the client forever.
    pub write_timeout: Option<Duration>,
    /// Bytes read from the tool's stdout per relay step.
    pub chunk_size: usize,
    pub launch: LaunchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::LOCALHOST,
            port: DEFAULT_PORT,
            accept_timeout: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
            write_timeout: None,
            chunk_size: 8192,
            launch: LaunchConfig::default(),
        }
    }
}

/// Validate a dotted IPv4 address (four octets, each 0-255).
pub fn ip_address(value: &str) -> Result<Ipv4Addr, String> {
    let parts: Vec<&str> = value.split('.').collect();
    let well_formed = parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.len() <= 3 && p.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        return Err(format!("invalid IP address: {value}"));
    }
    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(&parts) {
        *slot = part
            .parse::<u8>()
            .map_err(|_| format!("invalid IP address: {value}"))?;
    }
    Ok(Ipv4Addr::from(octets))
}
