//! `fim_janitor <parent_pid> <log_path> <mountpoint...>`: the fallback
//! reaper spawned once per booted instance by
//! [`flatimage::filesystems::Controller::new`].

use flatimage::janitor::{self, JanitorArgs};
use std::process::ExitCode;

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().collect();
    let args = match JanitorArgs::parse(&argv) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("fim_janitor: {e}");
            return ExitCode::FAILURE;
        }
    };

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_path)
        .ok();
    let (non_blocking, _guard) = match log_file {
        Some(f) => tracing_appender::non_blocking(f),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    flatimage::util::register_to_tracing(non_blocking, tracing_subscriber::EnvFilter::new("info"));

    match janitor::run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "janitor exited with error");
            ExitCode::FAILURE
        }
    }
}
