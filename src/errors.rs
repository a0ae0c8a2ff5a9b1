//! Error mapping guide:
//! - Every ProxyError becomes a 404 with `Connection: close`; nothing is retried.
//! - Bind failures exit with the OS error number so scripts can tell "address in use" apart.
//! - Client disconnects are not errors; see `relay::RelayOutcome`.
use std::fmt;
use std::io;
use std::string::FromUtf8Error;

/// Map a listener bind failure to a process exit code:
/// - the raw OS error number when it fits a u8 (EADDRINUSE, EACCES, ...)
/// - 1 otherwise
pub fn exit_code_for_bind_error(e: &io::Error) -> u8 {
    match e.raw_os_error() {
        Some(code) if (1..=255).contains(&code) => code as u8,
        _ => 1,
    }
}

/// Why an encoded request could not be turned into an argument list.
#[derive(Debug)]
pub enum DecodeError {
    Base64(base64::DecodeError),
    Utf8(FromUtf8Error),
    UnterminatedQuote,
    Empty,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Base64(e) => write!(f, "invalid base64 token: {e}"),
            DecodeError::Utf8(e) => write!(f, "decoded command is not UTF-8: {e}"),
            DecodeError::UnterminatedQuote => {
                write!(f, "decoded command has unbalanced quoting or a trailing escape")
            }
            DecodeError::Empty => write!(f, "decoded command is empty"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Base64(e) => Some(e),
            DecodeError::Utf8(e) => Some(e),
            _ => None,
        }
    }
}

impl From<base64::DecodeError> for DecodeError {
    fn from(e: base64::DecodeError) -> Self {
        DecodeError::Base64(e)
    }
}

impl From<FromUtf8Error> for DecodeError {
    fn from(e: FromUtf8Error) -> Self {
        DecodeError::Utf8(e)
    }
}

/// Request-level failures. All of them are answered with 404 before any process output is sent.
#[derive(Debug)]
pub enum ProxyError {
    Decode(DecodeError),
    ExecutableNotFound(String),
    UnsupportedTool { program: String, path: String },
    Spawn { program: String, source: io::Error },
    Resolve(String),
    Io(io::Error),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Decode(e) => write!(f, "{e}"),
            ProxyError::ExecutableNotFound(p) => write!(f, "executable not found: {p}"),
            ProxyError::UnsupportedTool { program, path } => {
                write!(f, "unsupported tool {program} ({path})")
            }
            ProxyError::Spawn { program, source } => {
                write!(f, "failed to start {program}: {source}")
            }
            ProxyError::Resolve(msg) => write!(f, "could not resolve stream url: {msg}"),
            ProxyError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Decode(e) => Some(e),
            ProxyError::Spawn { source, .. } => Some(source),
            ProxyError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DecodeError> for ProxyError {
    fn from(e: DecodeError) -> Self {
        ProxyError::Decode(e)
    }
}

impl From<io::Error> for ProxyError {
    fn from(e: io::Error) -> Self {
        ProxyError::Io(e)
    }
}

/// True for client-side socket failures that mean "the viewer went away".
pub fn is_disconnect(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => true,
        _ => e.raw_os_error() == Some(nix::libc::EINVAL),
    }
}
