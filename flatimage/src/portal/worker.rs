//! Per-request worker process.
//!
//! The worker opens its four stdio FIFOs, execs `message.command` with
//! `message.environment`, and reports the exit code over `message.exit`.
//! Runs entirely inside a freshly forked child — no threads, so a worker
//! that hangs only blocks its own process.

use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use flatimage_shared::transport::Message;
use std::io::Write;
use std::process::{Command, Stdio};

/// Run `message`'s command, relaying stdio through its FIFOs and writing
/// the child's pid and exit code to `message.pid`/`message.exit`. Intended
/// to run in the child half of a `fork()`; never returns on success (it
/// `exec`s) — returns only on setup failure, before any exec is attempted.
pub fn run(message: &Message) -> FlatimageResult<()> {
    super::fifo::create(&message.stdin)?;
    super::fifo::create(&message.stdout)?;
    super::fifo::create(&message.stderr)?;
    super::fifo::create(&message.pid)?;
    super::fifo::create(&message.exit)?;

    let (program, args) = message
        .command
        .split_first()
        .ok_or_else(|| FlatimageError::Portal("empty command".into()))?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.env_clear();
    for kv in &message.environment {
        if let Some((key, value)) = kv.split_once('=') {
            cmd.env(key, value);
        }
    }

    let mut child = cmd.spawn().map_err(FlatimageError::from)?;

    super::fifo::write_all_timed(&message.pid, child.id().to_string().as_bytes())?;

    relay_stdio(&message.stdin, &message.stdout, &message.stderr, &mut child)?;

    let status = child.wait().map_err(FlatimageError::from)?;
    let code = status.code().unwrap_or(-1);
    super::fifo::write_all_timed(&message.exit, code.to_string().as_bytes())?;
    Ok(())
}

fn relay_stdio(
    stdin_fifo: &std::path::Path,
    stdout_fifo: &std::path::Path,
    stderr_fifo: &std::path::Path,
    child: &mut std::process::Child,
) -> FlatimageResult<()> {
    use std::io::Read;

    if let Ok(mut input) = super::fifo::open_read_timed(stdin_fifo) {
        if let Some(mut stdin) = child.stdin.take() {
            let mut buf = Vec::new();
            let _ = input.read_to_end(&mut buf);
            let _ = stdin.write_all(&buf);
        }
    }

    if let Some(mut stdout) = child.stdout.take() {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf);
        let _ = super::fifo::write_all_timed(stdout_fifo, &buf);
    }

    if let Some(mut stderr) = child.stderr.take() {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        let _ = super::fifo::write_all_timed(stderr_fifo, &buf);
    }

    Ok(())
}

/// Detach the current process as a worker: new session, stdio closed.
/// Called immediately after `fork()` returns 0 in the daemon loop.
pub fn detach() -> FlatimageResult<()> {
    nix::unistd::setsid().map_err(|e| FlatimageError::Portal(format!("setsid: {e}")))?;
    Ok(())
}
