//! `fim-perms {add|del|set|clear|list}` — sandbox capability grants.

use crate::context::Context;
use clap::Subcommand;
use flatimage::jailer::config::PermissionSet;

#[derive(Subcommand, Debug)]
pub enum PermsCommand {
    /// Grant a permission (home, media, audio, wayland, xorg, dbus-user,
    /// dbus-system, udev, usb, input, gpu, network)
    Add { name: String },
    /// Revoke a permission
    Del { name: String },
    /// Replace the whole permission set
    Set { names: Vec<String> },
    /// Revoke every permission
    Clear,
    /// Print the currently granted permissions
    List,
}

pub fn execute(cmd: PermsCommand, ctx: &Context) -> anyhow::Result<()> {
    let mut file = ctx.open_reserved()?;
    let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
    let mut permissions = PermissionSet(region.read_permissions()?);

    match cmd {
        PermsCommand::Add { name } => {
            permissions
                .set_by_name(&name)
                .ok_or_else(|| anyhow::anyhow!("unknown permission '{name}'"))?;
            region.write_permissions(permissions.0)?;
            println!("{name}");
        }
        PermsCommand::Del { name } => {
            permissions
                .clear_by_name(&name)
                .ok_or_else(|| anyhow::anyhow!("unknown permission '{name}'"))?;
            region.write_permissions(permissions.0)?;
            println!("{name}");
        }
        PermsCommand::Set { names } => {
            let mut set = PermissionSet::empty();
            for name in &names {
                set.set_by_name(name)
                    .ok_or_else(|| anyhow::anyhow!("unknown permission '{name}'"))?;
            }
            region.write_permissions(set.0)?;
            for name in set.names() {
                println!("{name}");
            }
        }
        PermsCommand::Clear => {
            region.write_permissions(0)?;
        }
        PermsCommand::List => {
            for name in permissions.names() {
                println!("{name}");
            }
        }
    }
    Ok(())
}
