#![doc = r#"
LiveProxy: a local HTTP front-end that turns a request into a streamed media response.

A request names a stream either with query parameters (`/play/?url=...&q=best`) or with a
URL-safe base64 command line (`/base64/<token>/`). LiveProxy starts streamlink, yt-dlp or
youtube-dl with its output on a pipe and relays that output to the client until the tool
ends or the client disconnects. `/301/` asks the tool for the direct stream URL instead
and answers with a redirect.

Module map:
- config: explicit server and launch settings
- decoder: request target to argument list
- launcher: executable resolution, tool classification, process lifecycle
- relay: stdout/stderr multiplexing and disconnect handling
- server: accept loop, HTTP parsing, routing
- logging: explicit tracing context handed to the server
- playlist: `--file` playlist rewriting
- banner, errors, util: startup diagnostics, error types, small helpers
"#]

pub mod banner;
pub mod config;
pub mod decoder;
pub mod errors;
pub mod launcher;
pub mod logging;
pub mod playlist;
pub mod relay;
pub mod server;
pub mod util;

pub use config::{LaunchConfig, ServerConfig};
pub use decoder::ArgumentList;
pub use errors::{DecodeError, ProxyError};
pub use launcher::{LaunchMode, ProcessHandle, ToolKind};
pub use logging::{LogContext, LogLevel};
pub use relay::{RelayOutcome, RelayState};
pub use server::{Server, ServerHandle};
