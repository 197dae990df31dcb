//! `fim-exec`/`fim-root` and the no-subcommand default launch:
//! assemble a [`Jailer`] from the reserved-region permission/unshare bits
//! plus the stored bind list, then run the requested program against the
//! overlay plan the booter resolved — an already-mounted root, or (for the
//! `stacking` backend) the layer/upper/work dirs this process's own sandbox
//! builder composes via bwrap. Falls back to `union-fs` and retries if
//! bwrap reports the stacking mount itself failed.

use crate::context::Context;
use flatimage::binds_db;
use flatimage::boot_db;
use flatimage::filesystems::overlay;
use flatimage::jailer::{Jailer, JailerError, MountError, OverlayPlan, PermissionSet, RootMode, SandboxOptions, UnshareSet};
use flatimage_shared::constants::env;
use std::path::PathBuf;

fn env_path(name: &str) -> anyhow::Result<PathBuf> {
    std::env::var(name)
        .map(PathBuf::from)
        .map_err(|_| anyhow::anyhow!("{name} is not set"))
}

/// Rebuild the plan the booter resolved: a single already-mounted root for
/// `overlay-fs`/`union-fs`, or the layer list plus upper/work dirs for
/// `stacking`, which this process's sandbox builder composes itself via
/// bwrap's own `--overlay-src`/`--overlay`.
fn resolve_overlay_plan() -> anyhow::Result<OverlayPlan> {
    match std::env::var(env::OVERLAY_RESOLVED).ok().as_deref() {
        Some("stacking") => {
            let layers = std::env::var(env::DIR_LAYERS)
                .map_err(|_| anyhow::anyhow!("{} is not set", env::DIR_LAYERS))?
                .split(':')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
            let upper = env_path(env::DIR_UPPER)?;
            let work = env_path(env::DIR_WORK)?;
            Ok(OverlayPlan::Stacking { layers, upper, work })
        }
        _ => Ok(OverlayPlan::Mounted(env_path(env::DIR_MOUNT)?)),
    }
}

fn sandbox_options(ctx: &Context, force_root: bool) -> anyhow::Result<SandboxOptions> {
    let mut file = ctx.open_reserved()?;
    let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
    let permissions = PermissionSet(region.read_permissions()?);
    let unshare = UnshareSet(region.read_unshare()?);
    let casefold = region.read_casefold()?;
    drop(region);
    drop(file);

    let binds = binds_db::load(&ctx.dir_config)?;
    let root_mode = if force_root || std::env::var(env::ROOT).as_deref() == Ok("1") {
        RootMode::Root
    } else {
        RootMode::User
    };

    Ok(SandboxOptions { permissions, unshare, binds, root_mode, casefold })
}

fn run(ctx: &Context, force_root: bool, mut program: String, mut args: Vec<String>) -> anyhow::Result<i32> {
    if program.is_empty() {
        let mut file = ctx.open_reserved()?;
        let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
        let record = boot_db::decode(&region.read_boot()?)?;
        program = if record.program.is_empty() { "bash".to_string() } else { record.program };
        args = record.args;
    }

    let options = sandbox_options(ctx, force_root)?;
    let jailer = Jailer::new(options);

    let plan = resolve_overlay_plan()?;
    let home = std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/root"));
    let runtime_dir_host = env_path(env::DIR_RUNTIME_HOST)?;
    let program_path = std::path::Path::new(&program);

    let mut child = match jailer.spawn(&plan, &home, &runtime_dir_host, program_path, &args) {
        Ok(child) => child,
        Err(JailerError::Mount(MountError::Syscall { syscall, .. })) if syscall == "mount" => {
            let OverlayPlan::Stacking { layers, upper, .. } = &plan else {
                anyhow::bail!("mount failure reported for a non-stacking overlay plan");
            };
            tracing::warn!("stacking overlay mount failed at launch, falling back to union-fs");
            let fallback_mountpoint = env_path(env::DIR_MOUNT_OVERLAY)?;
            let mount = overlay::spawn_unionfs(layers, upper, &fallback_mountpoint)?;
            std::mem::forget(mount);
            let fallback_plan = OverlayPlan::Mounted(fallback_mountpoint);
            jailer.spawn(&fallback_plan, &home, &runtime_dir_host, program_path, &args)?
        }
        Err(e) => return Err(e.into()),
    };
    let status = child.wait()?;
    Ok(status.code().unwrap_or(-1))
}

pub fn execute_exec(ctx: &Context, command: Vec<String>) -> anyhow::Result<()> {
    let (program, args) = command.split_first().map(|(p, a)| (p.clone(), a.to_vec())).unwrap_or_default();
    let code = run(ctx, false, program, args)?;
    std::process::exit(code);
}

pub fn execute_root(ctx: &Context, command: Vec<String>) -> anyhow::Result<()> {
    let (program, args) = command.split_first().map(|(p, a)| (p.clone(), a.to_vec())).unwrap_or_default();
    let code = run(ctx, true, program, args)?;
    std::process::exit(code);
}

pub fn execute_default(ctx: &Context) -> anyhow::Result<()> {
    let code = run(ctx, false, String::new(), Vec::new())?;
    std::process::exit(code);
}
