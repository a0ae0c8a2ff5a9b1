//! Explicit logging context.
//!
//! `main` builds one `LogContext` and hands it to the server; each connection thread
//! runs under it with `LogContext::in_scope`. The library never installs a global
//! subscriber on its own, so tests can run several servers with separate log sinks.
use std::env;

use clap::ValueEnum;
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Overrides `--loglevel` with a full filter expression (e.g. `liveproxy=debug,liveproxy::tool=warn`).
pub const LOG_ENV: &str = "LIVEPROXY_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    None,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::None => "off",
            LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Clone)]
pub struct LogContext {
    dispatch: Dispatch,
    level: LogLevel,
}

impl std::fmt::Debug for LogContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogContext")
            .field("level", &self.level)
            .finish()
    }
}

impl LogContext {
    /// Log to stdout, coloured when stdout is a terminal.
    pub fn new(level: LogLevel) -> Self {
        let ansi = atty::is(atty::Stream::Stdout);
        Self::build(level, std::io::stdout, ansi)
    }

    /// Log to an arbitrary sink without colours.
    pub fn with_writer<W>(level: LogLevel, make_writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        Self::build(level, make_writer, false)
    }

    fn build<W>(level: LogLevel, make_writer: W, ansi: bool) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let filter = env::var(LOG_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| EnvFilter::try_new(s).ok())
            .unwrap_or_else(|| EnvFilter::new(level.directive()));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(make_writer)
            .with_ansi(ansi)
            .with_target(true);
        let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
        Self {
            dispatch: Dispatch::new(subscriber),
            level,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Run `f` with this context as the thread's default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}
