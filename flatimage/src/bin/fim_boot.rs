//! `fim_boot`: the self-mounting ELF entrypoint.
//!
//! Handle the fast-path version queries before anything else, export the build
//! identity into the environment, check for the fuse kernel module,
//! relocate off the read-only mount if needed, mount every layer, start
//! the host portal, then exec into the `fim` command surface with the
//! runtime contract set via `FIM_*` environment variables.

use flatimage::{bootstrap, config, filesystems, layers, reserved};
use flatimage_shared::constants::env;
use flatimage_shared::layout::{BuildId, Layout};
use flatimage_shared::transport::Mode;
use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

/// Patched by the image packer to the first filesystem byte after the
/// appended tool chain; `0` is only the pre-packing default,
/// overwritten by an external packer once the real offset is known.
#[used]
#[no_mangle]
#[link_section = ".fim_reserved_offset"]
static FIM_RESERVED_OFFSET: u32 = 0;

const FIM_VERSION: &str = env!("CARGO_PKG_VERSION");
const FIM_COMMIT: &str = env!("FIM_COMMIT");
const FIM_DIST: &str = env!("FIM_DIST");
const FIM_TIMESTAMP: &str = env!("FIM_TIMESTAMP");

fn log_level(args: &[String]) -> &'static str {
    if std::env::var(env::DEBUG).as_deref() == Ok("1") {
        return "debug";
    }
    match args.get(1).map(String::as_str) {
        None | Some("exec") | Some("root") => "error",
        _ => "info",
    }
}

fn fuse_module_loaded() -> bool {
    std::fs::read_to_string("/proc/filesystems")
        .map(|s| s.lines().any(|l| l.trim() == "fuse" || l.ends_with("\tfuse")))
        .unwrap_or(false)
}

/// `fim-version`/`fim-version-full` short-circuit before any mounting
/// happens, the way `boot.cpp`'s `main()` answers them before relocation.
fn handle_version_fast_path(args: &[String]) -> bool {
    match args.get(1).map(String::as_str) {
        Some("version") => {
            println!("{FIM_VERSION}");
            true
        }
        Some("version-full") => {
            println!(
                "{{\"VERSION\":\"{FIM_VERSION}\",\"COMMIT\":\"{FIM_COMMIT}\",\"DISTRIBUTION\":\"{FIM_DIST}\",\"TIMESTAMP\":\"{FIM_TIMESTAMP}\"}}"
            );
            true
        }
        _ => false,
    }
}

fn export_build_identity() {
    std::env::set_var(env::VERSION, FIM_VERSION);
    std::env::set_var(env::COMMIT, FIM_COMMIT);
    std::env::set_var(env::DIST, FIM_DIST);
    std::env::set_var(env::TIMESTAMP, FIM_TIMESTAMP);
}

/// `bwrap`'s kernel overlay directive needs unprivileged user namespaces;
/// some distributions disable them via this sysctl knob. Its absence means
/// the kernel never restricted them.
fn stacking_usable() -> bool {
    if !flatimage::jailer::bwrap::is_available() {
        return false;
    }
    std::fs::read_to_string("/proc/sys/kernel/unprivileged_userns_clone")
        .map(|s| s.trim() == "1")
        .unwrap_or(true)
}

/// Binaries produced by this workspace ship side by side; look next to the
/// running executable before falling back to `PATH`.
fn locate_sibling(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join(name)))
        .filter(|p| p.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if handle_version_fast_path(&args) {
        std::process::exit(0);
    }

    export_build_identity();

    let elf_path = std::env::current_exe()?;
    let reserved_offset = unsafe { FIM_RESERVED_OFFSET } as u64;
    let build = BuildId {
        commit: FIM_COMMIT.to_string(),
        timestamp: FIM_TIMESTAMP.parse().unwrap_or(0),
    };
    let layout = Layout::new(elf_path.clone(), build, std::process::id());

    std::fs::create_dir_all(layout.dir_instance())?;
    let log_path = layout.dir_mount().with_extension("boot.log");
    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(&log_path).ok();
    let (non_blocking, _guard) = match log_file {
        Some(f) => tracing_appender::non_blocking(f),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    flatimage::util::register_to_tracing(non_blocking, tracing_subscriber::EnvFilter::new(log_level(&args)));

    if !fuse_module_loaded() {
        tracing::warn!("'fuse' module might not be loaded");
    }

    let relocated = bootstrap::relocate(&elf_path, reserved_offset, &layout)?;
    if relocated.boot_binary != elf_path {
        let err = Command::new(&relocated.boot_binary).args(&args[1..]).exec();
        anyhow::bail!("failed to exec relocated binary {}: {err}", relocated.boot_binary.display());
    }

    let mut reserved_file = reserved::open(&elf_path, reserved_offset)?;
    let mut region = reserved::ReservedRegion::new(&mut reserved_file, reserved_offset);
    let reserved_casefold = region.read_casefold()?;
    let reserved_overlay = region.read_overlay()?;
    let stored_env = flatimage::env_db::decode(&region.read_environment()?)?;
    drop(region);
    drop(reserved_file);

    let program_env: HashMap<String, String> = stored_env.into_iter().collect();
    let runtime = config::resolve(&program_env, reserved_casefold, reserved_overlay, stacking_usable());

    let uid_gid = config::resolve_uid_gid(runtime.is_root, &program_env);
    config::write_passwd(&layout, uid_gid, &program_env)?;
    config::write_bashrc(&layout, &program_env)?;

    let chain_start = reserved_offset + reserved::offsets::TOTAL_SIZE;
    let (mut embedded, _chain_end) = layers::discover_embedded(&elf_path, chain_start)?;
    let mut external = layers::discover_external(
        std::env::var(env::DIRS_LAYER).ok().as_deref(),
        std::env::var(env::FILES_LAYER).ok().as_deref(),
    )?;
    embedded.append(&mut external);

    let controller = filesystems::Controller::new(layout.clone(), &embedded, runtime.overlay, runtime.is_casefold)?;
    let mount_root = controller.root();

    let fifo_dir = layout.dir_portal_fifo();
    flatimage::portal::dispatcher::ensure_daemon_running(
        &fifo_dir,
        Mode::Host,
        &locate_sibling("fim_portal_daemon"),
        &layout.path_daemon_log("host"),
    )?;

    let runtime_dir_host = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| format!("/run/user/{}", uid_gid.uid));

    std::env::set_var(env::FILE_BINARY, &elf_path);
    std::env::set_var(env::OFFSET, reserved_offset.to_string());
    std::env::set_var(env::DIR_CONFIG, layout.dir_config());
    std::env::set_var(env::DIR_GLOBAL, layout.dir_global());
    std::env::set_var(env::DIR_APP, layout.dir_app());
    std::env::set_var(env::DIR_APP_BIN, layout.dir_app_bin());
    std::env::set_var(env::DIR_APP_SBIN, layout.dir_app_sbin());
    std::env::set_var(env::DIR_INSTANCE, layout.dir_instance());
    std::env::set_var(env::DIR_MOUNT, &mount_root);
    std::env::set_var(env::DIR_RUNTIME_HOST, &runtime_dir_host);
    std::env::set_var(env::PID, std::process::id().to_string());

    std::env::set_var(env::OVERLAY_RESOLVED, controller.backend().as_str());
    std::env::set_var(env::DIR_UPPER, layout.dir_upper());
    std::env::set_var(env::DIR_WORK, layout.dir_work());
    std::env::set_var(env::DIR_MOUNT_OVERLAY, layout.dir_mount_overlayfs());
    let layer_dirs_joined = controller
        .layer_dirs()
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(":");
    std::env::set_var(env::DIR_LAYERS, layer_dirs_joined);

    let fim_binary = locate_sibling("fim");
    let err = Command::new(&fim_binary).args(&args[1..]).exec();
    anyhow::bail!("failed to exec {}: {err}", fim_binary.display());
}

fn main() {
    if let Err(e) = run() {
        eprintln!("fim_boot: {e}");
        std::process::exit(125);
    }
}
