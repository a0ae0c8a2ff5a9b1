//! TCP front-end: accept loop, one thread per connection, one request per connection.
pub mod http;
pub mod routing;

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::config::ServerConfig;
use crate::decoder::ArgumentList;
use crate::errors::ProxyError;
use crate::launcher::{self, LaunchMode, LaunchPlan};
use crate::logging::LogContext;
use crate::relay::{relay, RelayOptions, RelayOutcome};
use crate::util::id::create_request_id;
use crate::util::shell_join;
use http::{read_http_request, write_not_found, write_redirect, Method};
use routing::{classify, Route};

pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    log: LogContext,
    connections: AtomicU64,
}

impl Server {
    /// Bind the listening socket. Errors are fatal for the caller (address in use, bad host).
    pub fn bind(config: ServerConfig, log: LogContext) -> io::Result<Server> {
        let listener = TcpListener::bind((config.host, config.port))?;
        listener.set_nonblocking(true)?;
        Ok(Server {
            listener,
            config: Arc::new(config),
            log,
            connections: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `running` turns false. The flag is re-checked at least
    /// every `accept_timeout`.
    pub fn serve(&self, running: &AtomicBool) -> io::Result<()> {
        let timeout_ms = self
            .config
            .accept_timeout
            .as_millis()
            .clamp(1, u16::MAX as u128) as u16;
        while running.load(Ordering::SeqCst) {
            let readable = {
                let mut fds = [PollFd::new(self.listener.as_fd(), PollFlags::POLLIN)];
                match poll(&mut fds, PollTimeout::from(timeout_ms)) {
                    Ok(n) => n > 0,
                    Err(Errno::EINTR) => false,
                    Err(e) => return Err(io::Error::from(e)),
                }
            };
            if !readable {
                continue;
            }
            let (stream, peer) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    self.log.in_scope(|| tracing::warn!("accept error: {}", e));
                    std::thread::sleep(Duration::from_millis(50));
                    continue;
                }
            };
            self.dispatch(stream, peer);
        }
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let n = self.connections.fetch_add(1, Ordering::Relaxed);
        let config = self.config.clone();
        let log = self.log.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("liveproxy-conn-{n}"))
            .spawn(move || {
                log.in_scope(|| handle_connection(stream, peer, &config));
            });
        if let Err(e) = spawned {
            self.log
                .in_scope(|| tracing::error!("could not start connection thread: {}", e));
        }
    }

    /// Run `serve` on a background thread.
    pub fn spawn(self) -> io::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let thread = std::thread::Builder::new()
            .name("liveproxy-accept".to_string())
            .spawn(move || self.serve(&flag))?;
        Ok(ServerHandle {
            addr,
            running,
            thread: Some(thread),
        })
    }
}

/// Background server; stops accepting when dropped.
pub struct ServerHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<io::Result<()>>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&mut self) -> io::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        match self.thread.take() {
            Some(t) => t
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "accept thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn handle_connection(mut stream: TcpStream, peer: SocketAddr, config: &ServerConfig) {
    let span = tracing::info_span!("request", id = %create_request_id());
    let _enter = span.enter();

    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(config.request_timeout));
    let request = match read_http_request(&mut stream) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!("unreadable request from {}: {}", peer, e);
            let _ = write_not_found(&mut stream);
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
    };
    let _ = stream.set_read_timeout(None);
    let _ = stream.set_write_timeout(config.write_timeout);

    tracing::info!("User-Agent: {}", request.user_agent());
    tracing::info!("Client: {}", peer);
    tracing::info!("Address: {}", request.path);

    let result = if request.method == Method::Get {
        let route = classify(&request.path, &request.query);
        tracing::debug!("route: {}", route.name());
        handle_route(&mut stream, route, config)
    } else {
        tracing::debug!("{:?} is not served", request.method);
        write_not_found(&mut stream).map_err(ProxyError::from)
    };
    if let Err(e) = result {
        match e {
            ProxyError::Decode(_) => tracing::warn!("{}", e),
            _ => tracing::error!("{}", e),
        }
        if let Err(e) = write_not_found(&mut stream) {
            tracing::debug!("could not send 404: {}", e);
        }
    }
    let _ = stream.shutdown(Shutdown::Both);
}

/// Answer one routed request. Errors are answered with 404 by the caller; nothing has
/// been written to the client when an error is returned.
fn handle_route(
    stream: &mut TcpStream,
    route: Route,
    config: &ServerConfig,
) -> Result<(), ProxyError> {
    match route {
        Route::Play { query } => play(stream, ArgumentList::from_query(&query), config),
        Route::Base64 { token } => play(stream, ArgumentList::from_base64(&token)?, config),
        Route::Redirect { query } => redirect(stream, ArgumentList::from_query(&query), config),
        Route::NotFound => {
            tracing::debug!("no route");
            write_not_found(stream)?;
            Ok(())
        }
    }
}

fn play(stream: &mut TcpStream, list: ArgumentList, config: &ServerConfig) -> Result<(), ProxyError> {
    let plan = launcher::plan(&list, LaunchMode::Play, &config.launch)?;
    log_plan(&plan);
    let mut process = launcher::spawn(&plan, config.launch.grace)?;
    tracing::debug!("{} running as pid {}", plan.display_name(), process.pid());

    let options = RelayOptions {
        chunk_size: config.chunk_size,
        ..RelayOptions::default()
    };
    let report = relay(&mut process, stream, &options);
    match report.outcome {
        RelayOutcome::Completed { exit_code } => tracing::info!(
            "Stream ended: {} bytes sent, {} exited with {}",
            report.bytes_sent,
            plan.display_name(),
            exit_code
        ),
        RelayOutcome::NoOutput { exit_code } => {
            tracing::error!(
                "{} exited with {} before sending any data",
                plan.display_name(),
                exit_code
            );
            write_not_found(stream)?;
        }
        RelayOutcome::ClientDisconnected => {
            tracing::info!("Stream closed after {} bytes", report.bytes_sent)
        }
        RelayOutcome::Failed(msg) => tracing::error!("Stream failed: {}", msg),
    }
    Ok(())
}

fn redirect(
    stream: &mut TcpStream,
    list: ArgumentList,
    config: &ServerConfig,
) -> Result<(), ProxyError> {
    let plan = launcher::plan(&list, LaunchMode::Resolve, &config.launch)?;
    log_plan(&plan);
    let url = launcher::resolve_url(&plan, config.launch.resolve_timeout)?;
    tracing::info!("301 - URL: {}", url);
    write_redirect(stream, &url)?;
    Ok(())
}

fn log_plan(plan: &LaunchPlan) {
    tracing::info!(
        "Starting {} ({}, {}): {}",
        plan.display_name(),
        plan.kind.as_str(),
        plan.mode.as_str(),
        shell_join(&plan.args)
    );
}
