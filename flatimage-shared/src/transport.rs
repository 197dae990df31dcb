//! Portal wire schema.
//!
//! The dispatcher serializes one [`Message`] per request and writes it to a daemon's
//! listen FIFO; the daemon deserializes it, validates the required keys,
//! and forks a worker. Represented here as a plain serde struct rather than
//! the source's hand-rolled `ns_db` key/value reader — `serde_json` already
//! rejects missing required keys by default, matching the "any
//! deviation is logged and the message dropped" rule at the deserialize
//! call site rather than inside the type.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which namespace a portal daemon serves requests for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Host,
    Guest,
}

impl Mode {
    pub fn lower(&self) -> &'static str {
        match self {
            Mode::Host => "host",
            Mode::Guest => "guest",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lower())
    }
}

/// One portal request: run `command` with `environment`, relaying stdio and
/// exit code over the named FIFOs. All fields are required; a message
/// missing one, or with a field of the wrong JSON type, fails
/// deserialization and the caller drops it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub command: Vec<String>,
    pub stdin: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub pid: PathBuf,
    pub exit: PathBuf,
    pub log: PathBuf,
    /// `KEY=VALUE` pairs, matching the source's `vector<string>` shape
    /// rather than a map, so duplicate keys and ordering are preserved
    /// exactly as handed to `execve`.
    pub environment: Vec<String>,
}

impl Message {
    /// Build the request for `command`, deriving the five FIFO paths from
    /// `fifo_dir/<pid>/{stdin,stdout,stderr,pid,exit}.fifo` the way
    /// a request's paired FIFOs live under.
    pub fn new(
        pid: u32,
        command: Vec<String>,
        fifo_dir: &std::path::Path,
        log: std::path::PathBuf,
        environment: Vec<String>,
    ) -> Self {
        let dir = fifo_dir.join(pid.to_string());
        Message {
            command,
            stdin: dir.join("stdin.fifo"),
            stdout: dir.join("stdout.fifo"),
            stderr: dir.join("stderr.fifo"),
            pid: dir.join("pid.fifo"),
            exit: dir.join("exit.fifo"),
            log,
            environment,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse and validate a raw line from the daemon's listen FIFO. Any
    /// JSON error (missing key, wrong type, malformed syntax) is returned
    /// as `Err` so the daemon can log-and-drop the malformed request.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let msg = Message::new(
            42,
            vec!["/bin/true".into()],
            std::path::Path::new("/tmp/fifo"),
            "/tmp/fifo/42/daemon.log".into(),
            vec!["HOME=/root".into()],
        );
        let json = msg.to_json().unwrap();
        let back = Message::from_json(&json).unwrap();
        assert_eq!(back.command, vec!["/bin/true".to_string()]);
        assert_eq!(back.stdin, std::path::Path::new("/tmp/fifo/42/stdin.fifo"));
        assert_eq!(back.exit, std::path::Path::new("/tmp/fifo/42/exit.fifo"));
    }

    #[test]
    fn missing_required_key_is_rejected() {
        let raw = r#"{"command":["/bin/true"],"stdin":"/a","stdout":"/b"}"#;
        assert!(Message::from_json(raw).is_err());
    }

    #[test]
    fn mode_lowercases_for_fifo_names() {
        assert_eq!(Mode::Host.lower(), "host");
        assert_eq!(Mode::Guest.lower(), "guest");
    }
}
