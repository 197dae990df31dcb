//! Janitor: a fallback reaper that unmounts everything if the main process
//! dies without cleaning up after itself.
//!
//! Forked before any mount happens, it creates its own session (`setsid`), then polls
//! `kill(parent_pid, 0)` every [`JANITOR_POLL_MS`] until either the parent
//! sends `SIGTERM` (normal exit — skip cleanup) or the parent's pid
//! disappears (abnormal exit — unmount everything in the order given,
//! which the controller already reverses to innermost-first). Argv is
//! `[parent_pid, log_path, mountpoint...]`; the source's own cleanup loop
//! iterates `argv+2`, which also re-visits `log_path` as if it were a
//! mountpoint — not reproduced here, since it has no counterpart that
//! should survive translation.

use flatimage_shared::constants::JANITOR_POLL_MS;
use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static PARENT_OK: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigterm(_: i32) {
    PARENT_OK.store(true, Ordering::SeqCst);
}

pub struct JanitorArgs {
    pub parent_pid: i32,
    pub log_path: PathBuf,
    pub mountpoints: Vec<PathBuf>,
}

impl JanitorArgs {
    pub fn parse(argv: &[String]) -> FlatimageResult<Self> {
        if argv.len() < 3 {
            return Err(FlatimageError::Janitor(
                "usage: fim_janitor <parent_pid> <log_path> <mountpoint...>".into(),
            ));
        }
        let parent_pid: i32 = argv[1]
            .parse()
            .map_err(|_| FlatimageError::Janitor(format!("invalid pid: {}", argv[1])))?;
        Ok(JanitorArgs {
            parent_pid,
            log_path: PathBuf::from(&argv[2]),
            mountpoints: argv[3..].iter().map(PathBuf::from).collect(),
        })
    }
}

/// Run the janitor loop to completion. Installs the `SIGTERM` handler,
/// creates a new session, then polls until either the parent signals a
/// clean exit or its pid vanishes, at which point every mountpoint is
/// unmounted via `fusermount -zu`.
pub fn run(args: &JanitorArgs) -> FlatimageResult<()> {
    unsafe {
        nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGTERM,
            nix::sys::signal::SigHandler::Handler(on_sigterm),
        )
        .map_err(|e| FlatimageError::Janitor(format!("sigaction: {e}")))?;
        nix::sys::signal::signal(nix::sys::signal::Signal::SIGPIPE, nix::sys::signal::SigHandler::SigIgn)
            .map_err(|e| FlatimageError::Janitor(format!("sigaction: {e}")))?;
    }

    nix::unistd::setsid().map_err(|e| FlatimageError::Janitor(format!("setsid: {e}")))?;

    let parent = nix::unistd::Pid::from_raw(args.parent_pid);
    while !PARENT_OK.load(Ordering::SeqCst) && nix::sys::signal::kill(parent, None).is_ok() {
        std::thread::sleep(Duration::from_millis(JANITOR_POLL_MS));
    }

    if PARENT_OK.load(Ordering::SeqCst) {
        tracing::info!(parent_pid = args.parent_pid, "parent exited cleanly, skipping cleanup");
        return Ok(());
    }

    tracing::error!(parent_pid = args.parent_pid, "parent exited abnormally, cleaning up");
    for mountpoint in &args.mountpoints {
        tracing::info!(mountpoint = %mountpoint.display(), "unmounting");
        let status = std::process::Command::new("fusermount")
            .arg("-zu")
            .arg(mountpoint)
            .status();
        if let Err(e) = status {
            tracing::error!(mountpoint = %mountpoint.display(), error = %e, "could not unmount");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pid_log_and_mountpoints() {
        let argv = vec![
            "fim_janitor".to_string(),
            "1234".to_string(),
            "/tmp/x.janitor.log".to_string(),
            "/tmp/mnt/0".to_string(),
            "/tmp/mnt/overlayfs".to_string(),
        ];
        let args = JanitorArgs::parse(&argv).unwrap();
        assert_eq!(args.parent_pid, 1234);
        assert_eq!(args.mountpoints.len(), 2);
    }

    #[test]
    fn rejects_too_few_arguments() {
        let argv = vec!["fim_janitor".to_string(), "1234".to_string()];
        assert!(JanitorArgs::parse(&argv).is_err());
    }
}
