//! Portal daemon: listens for requests on a well-known FIFO and forks one
//! worker per request.
//!
//! One daemon runs per [`flatimage_shared::transport::Mode`] (host or guest),
//! reading length-delimited JSON [`Message`]s off its listen FIFO in a
//! loop. A message that fails to deserialize is logged and dropped, never
//! fatal to the daemon.

use flatimage_shared::constants::env;
use flatimage_shared::errors::FlatimageResult;
use flatimage_shared::transport::{Message, Mode};
use std::path::{Path, PathBuf};

pub struct Daemon {
    mode: Mode,
    fifo_dir: PathBuf,
    log_path: PathBuf,
}

impl Daemon {
    pub fn new(mode: Mode, fifo_dir: PathBuf, log_path: PathBuf) -> Self {
        Daemon {
            mode,
            fifo_dir,
            log_path,
        }
    }

    pub fn listen_fifo(&self) -> PathBuf {
        self.fifo_dir.join(format!("{}.listen.fifo", self.mode.lower()))
    }

    /// Block forever, accepting requests. Each accepted [`Message`] is
    /// handled by forking: the child detaches and runs
    /// [`super::worker::run`], the parent immediately loops back to
    /// accept the next request.
    pub fn serve(&self) -> FlatimageResult<()> {
        super::fifo::create(&self.listen_fifo())?;
        tracing::info!(mode = %self.mode, fifo = %self.listen_fifo().display(), "portal daemon listening");

        loop {
            let raw = match super::fifo::read_line_timed(&self.listen_fifo()) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::debug!(error = %e, "listen fifo read timed out, retrying");
                    continue;
                }
            };

            let message = match Message::from_json(&raw) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed portal message");
                    continue;
                }
            };

            match unsafe { nix::unistd::fork() } {
                Ok(nix::unistd::ForkResult::Parent { .. }) => continue,
                Ok(nix::unistd::ForkResult::Child) => {
                    if let Err(e) = super::worker::detach().and_then(|_| super::worker::run(&message)) {
                        tracing::error!(error = %e, "worker failed");
                    }
                    std::process::exit(0);
                }
                Err(e) => {
                    tracing::error!(error = %e, "fork failed, dropping request");
                }
            }
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Resolve the mode to run as from `FIM_PID`'s context: the host daemon
/// runs in the launching process, the guest daemon runs inside the
/// sandbox, distinguished by the binary's own invocation rather than by
/// environment — `mode` is therefore always passed
/// explicitly by the caller (`fim_boot` for host, the sandboxed entrypoint
/// for guest) rather than inferred here.
pub fn resolve_fifo_dir(layout: &flatimage_shared::layout::Layout) -> PathBuf {
    layout.dir_portal_fifo()
}

pub fn pid_env_var() -> &'static str {
    env::PID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_fifo_name_includes_mode() {
        let daemon = Daemon::new(Mode::Host, PathBuf::from("/tmp/fifo"), PathBuf::from("/tmp/log"));
        assert_eq!(daemon.listen_fifo(), PathBuf::from("/tmp/fifo/host.listen.fifo"));
    }
}
