//! Client side of the portal protocol: submit a request to a running
//! daemon and relay the caller's own stdio through the response FIFOs.
//!
//! Shells out through the portal rather than exec'ing directly, so `fim-exec`-style
//! commands reach the guest's mount namespace without re-entering bwrap.

use super::fifo;
use flatimage_shared::errors::FlatimageResult;
use flatimage_shared::transport::{Message, Mode};
use nix::sys::signal::{self, SigHandler, Signal};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};

/// Pid of the worker's child, set once its `message.pid` FIFO has been read
/// so the forwarding handlers below have somewhere to relay a signal to.
static FORWARD_PID: AtomicI32 = AtomicI32::new(0);

extern "C" fn forward_signal(sig: i32) {
    let pid = FORWARD_PID.load(Ordering::Relaxed);
    if pid > 0 {
        unsafe {
            libc::kill(pid, sig);
        }
    }
}

/// Forward the signals a foreground process is expected to react to onto
/// the remote child once its pid is known, so killing the `fim-exec`
/// dispatcher (Ctrl-C, `kill`, a logind session hangup) reaches the
/// sandboxed process instead of leaving it running detached.
fn install_signal_forwarding() -> FlatimageResult<()> {
    for sig in [Signal::SIGTERM, Signal::SIGINT, Signal::SIGHUP, Signal::SIGUSR1, Signal::SIGUSR2] {
        unsafe {
            signal::signal(sig, SigHandler::Handler(forward_signal))
                .map_err(|e| flatimage_shared::errors::FlatimageError::Portal(format!("sigaction failed: {e}")))?;
        }
    }
    Ok(())
}

/// Submit `command` to the daemon serving `mode` and block until it
/// finishes, copying the caller's stdin to the request and its stdout and
/// exit code back. Returns the remote process's exit code.
pub fn dispatch(
    fifo_dir: &Path,
    mode: Mode,
    pid: u32,
    command: Vec<String>,
    log: std::path::PathBuf,
    environment: Vec<String>,
    stdin: &mut impl Read,
    stdout: &mut impl Write,
) -> FlatimageResult<i32> {
    let message = Message::new(pid, command, fifo_dir, log, environment);
    let listen_fifo = fifo_dir.join(format!("{}.listen.fifo", mode.lower()));

    fifo::create(&message.stdin)?;
    fifo::create(&message.stdout)?;
    fifo::create(&message.stderr)?;
    fifo::create(&message.pid)?;
    fifo::create(&message.exit)?;

    let json = message.to_json()?;
    fifo::write_all_timed(&listen_fifo, json.as_bytes())?;

    install_signal_forwarding()?;
    let pid_raw = fifo::read_line_timed(&message.pid)?;
    if let Ok(child_pid) = pid_raw.trim().parse::<i32>() {
        FORWARD_PID.store(child_pid, Ordering::Relaxed);
    }

    let mut buf = Vec::new();
    stdin.read_to_end(&mut buf)?;
    fifo::write_all_timed(&message.stdin, &buf)?;

    let response = fifo::read_line_timed(&message.stdout)?;
    stdout.write_all(response.as_bytes())?;

    let exit_raw = fifo::read_line_timed(&message.exit)?;
    Ok(exit_raw.trim().parse().unwrap_or(-1))
}

/// Ensure the daemon for `mode` is listening, spawning it via
/// `fim_portal_daemon` if its listen FIFO does not yet exist.
pub fn ensure_daemon_running(
    fifo_dir: &Path,
    mode: Mode,
    daemon_binary: &Path,
    log_path: &Path,
) -> FlatimageResult<()> {
    let listen_fifo = fifo_dir.join(format!("{}.listen.fifo", mode.lower()));
    if listen_fifo.exists() {
        return Ok(());
    }
    std::process::Command::new(daemon_binary)
        .arg(mode.lower())
        .arg(fifo_dir)
        .arg(log_path)
        .spawn()?;
    Ok(())
}
