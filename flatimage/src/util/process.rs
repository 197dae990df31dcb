//! Process validation utilities for PID checking.

use flatimage_shared::errors::{FlatimageError, FlatimageResult};
use std::path::Path;

/// Read a PID from a file, trimming a trailing newline if present.
pub fn read_pid_file(path: &Path) -> FlatimageResult<u32> {
    let content = std::fs::read_to_string(path)?;
    content
        .trim()
        .parse::<u32>()
        .map_err(|e| FlatimageError::Janitor(format!("invalid pid in {}: {e}", path.display())))
}

/// Send `SIGKILL` to a process. Returns `true` if the process was killed or
/// no longer exists.
pub fn kill_process(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, libc::SIGKILL) == 0 || !is_process_alive(pid) }
}

/// Check liveness with `kill(pid, 0)`.
pub fn is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn very_high_pid_is_not_alive() {
        assert!(!is_process_alive(999999999));
    }

    #[test]
    fn read_pid_file_trims_newline() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "12345").unwrap();
        assert_eq!(read_pid_file(file.path()).unwrap(), 12345);
    }

    #[test]
    fn read_pid_file_rejects_garbage() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not-a-pid").unwrap();
        assert!(read_pid_file(file.path()).is_err());
    }

    #[test]
    fn read_pid_file_missing_is_error() {
        assert!(read_pid_file(Path::new("/nonexistent/path/to/pid.file")).is_err());
    }
}
