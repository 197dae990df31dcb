//! `fim-desktop {setup|enable|clean|dump}` — XDG desktop integration. The
//! `.desktop` entry and icon are stored in the reserved region and
//! materialized under `$XDG_DATA_HOME` on `setup`/`enable`.

use crate::context::Context;
use clap::Subcommand;
use std::io::Write;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum DesktopCommand {
    /// Install the `.desktop` entry and icon under `$XDG_DATA_HOME`
    Setup,
    /// Alias for `setup`, kept for the original CLI's naming
    Enable,
    /// Remove the installed `.desktop` entry and icon
    Clean,
    /// Print a stored record to stdout
    Dump {
        #[command(subcommand)]
        what: DumpTarget,
    },
}

#[derive(Subcommand, Debug)]
pub enum DumpTarget {
    Icon,
    Entry,
}

fn xdg_data_home() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("neither XDG_DATA_HOME nor HOME is set"))?;
    Ok(PathBuf::from(home).join(".local/share"))
}

fn app_name(ctx: &Context) -> String {
    ctx.elf_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("flatimage")
        .to_string()
}

fn desktop_file_path(ctx: &Context) -> anyhow::Result<PathBuf> {
    Ok(xdg_data_home()?.join("applications").join(format!("{}.desktop", app_name(ctx))))
}

fn icon_file_path(ctx: &Context, ext: &str) -> anyhow::Result<PathBuf> {
    Ok(xdg_data_home()?
        .join("icons/hicolor/256x256/apps")
        .join(format!("application-flatimage_{}.{ext}", app_name(ctx))))
}

fn install(ctx: &Context) -> anyhow::Result<()> {
    let mut file = ctx.open_reserved()?;
    let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
    let entry = region.read_desktop()?;
    if entry.is_empty() {
        anyhow::bail!("no desktop entry stored — nothing to install");
    }

    let desktop_path = desktop_file_path(ctx)?;
    std::fs::create_dir_all(desktop_path.parent().unwrap())?;
    std::fs::write(&desktop_path, &entry)?;
    println!("{}", desktop_path.display());

    if let Ok((ext, bytes)) = region.read_icon() {
        if !bytes.is_empty() {
            let icon_path = icon_file_path(ctx, &ext)?;
            std::fs::create_dir_all(icon_path.parent().unwrap())?;
            let mut f = std::fs::File::create(&icon_path)?;
            f.write_all(&bytes)?;
            println!("{}", icon_path.display());
        }
    }
    Ok(())
}

fn clean(ctx: &Context) -> anyhow::Result<()> {
    let desktop_path = desktop_file_path(ctx)?;
    let _ = std::fs::remove_file(&desktop_path);
    for ext in ["png", "svg"] {
        let _ = std::fs::remove_file(icon_file_path(ctx, ext)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_elf(path: &str) -> Context {
        Context {
            elf_path: PathBuf::from(path),
            reserved_offset: 0,
            dir_config: PathBuf::from("/tmp/unused"),
        }
    }

    #[test]
    fn app_name_strips_extension() {
        assert_eq!(app_name(&ctx_with_elf("/opt/games/doom.flatimage")), "doom");
    }

    #[test]
    fn app_name_falls_back_when_unparseable() {
        assert_eq!(app_name(&ctx_with_elf("/")), "flatimage");
    }
}

pub fn execute(cmd: DesktopCommand, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        DesktopCommand::Setup | DesktopCommand::Enable => install(ctx),
        DesktopCommand::Clean => clean(ctx),
        DesktopCommand::Dump { what } => {
            let mut file = ctx.open_reserved()?;
            let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
            match what {
                DumpTarget::Entry => {
                    print!("{}", String::from_utf8_lossy(&region.read_desktop()?));
                }
                DumpTarget::Icon => {
                    let (ext, bytes) = region.read_icon()?;
                    eprintln!("extension: {ext}, {} bytes", bytes.len());
                    std::io::stdout().write_all(&bytes)?;
                }
            }
            Ok(())
        }
    }
}
