mod cli;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use liveproxy::banner;
use liveproxy::errors::exit_code_for_bind_error;
use liveproxy::logging::LogContext;
use liveproxy::playlist;
use liveproxy::server::Server;

use crate::cli::Cli;

/// Exit code after SIGINT, as shells report it.
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log = LogContext::new(cli.loglevel);
    log.in_scope(|| run(&cli, &log))
}

fn run(cli: &Cli, log: &LogContext) -> ExitCode {
    banner::check_root();
    banner::log_current_versions(None);

    if let Some(rewrite) = cli.rewrite() {
        return match playlist::run(&rewrite) {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{:#}", e);
                ExitCode::from(1)
            }
        };
    }

    let config = cli.server_config();
    let (host, port) = (config.host, config.port);
    tracing::info!("Starting server: {} on port {}", host, port);
    let server = match Server::bind(config, log.clone()) {
        Ok(s) => s,
        Err(e) => {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!("Could not listen on port {}! Exiting...", port);
            } else {
                tracing::error!("Error {}! Exiting...", e);
            }
            return ExitCode::from(exit_code_for_bind_error(&e));
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let running = running.clone();
        let interrupted = interrupted.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            running.store(false, Ordering::SeqCst);
        }) {
            tracing::warn!("could not install interrupt handler: {}", e);
        }
    }
    if let Ok(addr) = server.local_addr() {
        tracing::info!("Listening on http://{}/", addr);
    }

    let served = server.serve(&running);
    let code = if interrupted.load(Ordering::SeqCst) {
        tracing::error!("Interrupted! Exiting...");
        ExitCode::from(EXIT_INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    };
    tracing::info!("Closing server {} on port {} ...", host, port);
    if let Err(e) = served {
        tracing::error!("server stopped: {}", e);
        return ExitCode::from(1);
    }
    code
}
