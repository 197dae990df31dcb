//! `fim_portal_daemon <host|guest> <fifo_dir> <log_path>`: the long-running
//! per-mode request listener, spawned on demand by
//! [`flatimage::portal::dispatcher::ensure_daemon_running`].

use flatimage::portal::daemon::Daemon;
use flatimage_shared::transport::Mode;
use std::path::PathBuf;
use std::process::ExitCode;

fn parse_mode(s: &str) -> Option<Mode> {
    match s {
        "host" => Some(Mode::Host),
        "guest" => Some(Mode::Guest),
        _ => None,
    }
}

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();
    if argv.len() < 4 {
        eprintln!("usage: fim_portal_daemon <host|guest> <fifo_dir> <log_path>");
        return ExitCode::FAILURE;
    }
    let Some(mode) = parse_mode(&argv[1]) else {
        eprintln!("fim_portal_daemon: invalid mode '{}'", argv[1]);
        return ExitCode::FAILURE;
    };
    let fifo_dir = PathBuf::from(&argv[2]);
    let log_path = PathBuf::from(&argv[3]);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();
    let (non_blocking, _guard) = match log_file {
        Some(f) => tracing_appender::non_blocking(f),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    flatimage::util::register_to_tracing(non_blocking, tracing_subscriber::EnvFilter::new("info"));

    let daemon = Daemon::new(mode, fifo_dir, log_path);
    if let Err(e) = daemon.serve() {
        tracing::error!(error = %e, "portal daemon exited with error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
