//! Top-level runtime configuration: resolves UID/GID, overlay backend,
//! compression level and the synthesized `passwd`/`bashrc` files a launch
//! needs, distinct from [`crate::jailer::config::SandboxOptions`] which
//! only covers the sandbox's own bind/permission/unshare directives.
//!
//! Resolves program environment, passwd/bashrc materialization, and uid/gid.

use crate::filesystems::overlay::{self, OverlayBackend};
use flatimage_shared::constants::env;
use flatimage_shared::errors::FlatimageResult;
use flatimage_shared::layout::Layout;
use std::collections::HashMap;
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UidGid {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub is_root: bool,
    pub is_readonly: bool,
    pub is_debug: bool,
    pub is_casefold: bool,
    pub is_notify: bool,
    pub overlay: OverlayBackend,
    pub compression_level: u8,
    pub env_path: String,
}

/// Assemble the runtime configuration from environment variables and the
/// reserved-region defaults already read out of the ELF, applying the same
/// precedence: explicit `FIM_*`
/// overrides win over whatever was baked into the image.
pub fn resolve(
    program_env: &HashMap<String, String>,
    reserved_casefold: bool,
    reserved_overlay: OverlayBackend,
    stacking_usable: bool,
) -> RuntimeConfig {
    let is_root = std::env::var(env::ROOT).as_deref() == Ok("1");
    let is_readonly = std::env::var(env::RO).as_deref() == Ok("1");
    let is_debug = std::env::var(env::DEBUG).as_deref() == Ok("1");
    let is_casefold = std::env::var(env::CASEFOLD).as_deref() == Ok("1") || reserved_casefold;

    let overlay = overlay::resolve(std::env::var(env::OVERLAY).ok().as_deref(), reserved_overlay, stacking_usable);

    let compression_level = std::env::var(env::COMPRESSION_LEVEL)
        .ok()
        .and_then(|s| s.parse::<u8>().ok())
        .unwrap_or(flatimage_shared::constants::DEFAULT_COMPRESSION_LEVEL)
        .min(9);

    let mut env_path = String::new();
    env_path.push_str(":/sbin:/usr/sbin:/usr/local/sbin:/bin:/usr/bin:/usr/local/bin");
    if let Some(existing) = program_env.get("PATH") {
        env_path = format!("{existing}{env_path}");
    }

    RuntimeConfig {
        is_root,
        is_readonly,
        is_debug,
        is_casefold,
        is_notify: false,
        overlay,
        compression_level,
        env_path,
    }
}

/// Resolve the container UID/GID: root mode forces `0:0`, otherwise `UID`
/// and `GID` keys in the program's stored environment override the host
/// user's own values.
pub fn resolve_uid_gid(is_root: bool, program_env: &HashMap<String, String>) -> UidGid {
    if is_root {
        return UidGid { uid: 0, gid: 0 };
    }

    let host_uid = nix::unistd::getuid().as_raw();
    let host_gid = nix::unistd::getgid().as_raw();

    let uid = program_env
        .get("UID")
        .and_then(|v| v.parse().ok())
        .unwrap_or(host_uid);
    let gid = program_env
        .get("GID")
        .and_then(|v| v.parse().ok())
        .unwrap_or(host_gid);

    UidGid { uid, gid }
}

/// Write the synthesized `/etc/passwd` entry for this instance, honoring a
/// custom `USER` key in the program's stored environment.
pub fn write_passwd(layout: &Layout, uid_gid: UidGid, program_env: &HashMap<String, String>) -> FlatimageResult<std::path::PathBuf> {
    let path = layout.path_passwd();
    let mut file = fs::File::create(&path)?;

    let user = program_env.get("USER").cloned().unwrap_or_else(|| "flatimage".to_string());
    let home = format!("/home/{user}");
    writeln!(
        file,
        "{user}:x:{}:{}:{user}:{home}:/bin/bash",
        uid_gid.uid, uid_gid.gid
    )?;
    Ok(path)
}

/// Write the synthesized `bashrc`, honoring a custom `PS1` key.
pub fn write_bashrc(layout: &Layout, program_env: &HashMap<String, String>) -> FlatimageResult<std::path::PathBuf> {
    let path = layout.path_bashrc();
    let mut file = fs::File::create(&path)?;

    match program_env.get("PS1") {
        Some(ps1) => writeln!(file, "export PS1=\"{ps1}\"")?,
        None => writeln!(file, "export PS1=\"[flatimage-${{FIM_DIST,,}}] \\W > \"")?,
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_mode_forces_zero_uid_gid() {
        let env = HashMap::new();
        let ids = resolve_uid_gid(true, &env);
        assert_eq!(ids, UidGid { uid: 0, gid: 0 });
    }

    #[test]
    fn custom_uid_gid_override_host_values() {
        let mut env = HashMap::new();
        env.insert("UID".to_string(), "5000".to_string());
        env.insert("GID".to_string(), "5001".to_string());
        let ids = resolve_uid_gid(false, &env);
        assert_eq!(ids, UidGid { uid: 5000, gid: 5001 });
    }

    #[test]
    fn invalid_custom_uid_falls_back_to_host() {
        let mut env = HashMap::new();
        env.insert("UID".to_string(), "not-a-number".to_string());
        let ids = resolve_uid_gid(false, &env);
        assert_eq!(ids.uid, nix::unistd::getuid().as_raw());
    }

    #[test]
    fn passwd_uses_custom_user_name() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(
            dir.path().join("app.flatimage"),
            flatimage_shared::layout::BuildId { commit: "a".into(), timestamp: 1 },
            1,
        )
        .with_global_root(dir.path());
        fs::create_dir_all(layout.dir_instance()).unwrap();

        let mut env = HashMap::new();
        env.insert("USER".to_string(), "gamer".to_string());
        let path = write_passwd(&layout, UidGid { uid: 1000, gid: 1000 }, &env).unwrap();
        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.starts_with("gamer:x:1000:1000"));
    }

    #[test]
    fn bashrc_defaults_without_custom_ps1() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(
            dir.path().join("app.flatimage"),
            flatimage_shared::layout::BuildId { commit: "a".into(), timestamp: 1 },
            1,
        )
        .with_global_root(dir.path());
        fs::create_dir_all(layout.dir_instance()).unwrap();

        let path = write_bashrc(&layout, &HashMap::new()).unwrap();
        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.contains("flatimage-"));
    }
}
