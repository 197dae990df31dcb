//! `fim-unshare {set|add|del|clear|list}` — the "unshare" record
//! item 6.

use crate::context::Context;
use clap::Subcommand;
use flatimage::jailer::config::UnshareSet;

#[derive(Subcommand, Debug)]
pub enum UnshareCommand {
    /// Replace the whole unshare set (user, ipc, pid, net, uts, cgroup)
    Set { names: Vec<String> },
    Add { name: String },
    Del { name: String },
    Clear,
    List,
}

pub fn execute(cmd: UnshareCommand, ctx: &Context) -> anyhow::Result<()> {
    let mut file = ctx.open_reserved()?;
    let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
    let mut unshare = UnshareSet(region.read_unshare()?);

    match cmd {
        UnshareCommand::Set { names } => {
            let mut set = UnshareSet::default();
            for name in &names {
                set.set_by_name(name)
                    .ok_or_else(|| anyhow::anyhow!("unknown namespace '{name}'"))?;
            }
            region.write_unshare(set.0)?;
            for name in set.names() {
                println!("{name}");
            }
        }
        UnshareCommand::Add { name } => {
            unshare
                .set_by_name(&name)
                .ok_or_else(|| anyhow::anyhow!("unknown namespace '{name}'"))?;
            region.write_unshare(unshare.0)?;
            println!("{name}");
        }
        UnshareCommand::Del { name } => {
            unshare
                .clear_by_name(&name)
                .ok_or_else(|| anyhow::anyhow!("unknown namespace '{name}'"))?;
            region.write_unshare(unshare.0)?;
            println!("{name}");
        }
        UnshareCommand::Clear => {
            region.write_unshare(0)?;
        }
        UnshareCommand::List => {
            for name in unshare.names() {
                println!("{name}");
            }
        }
    }
    Ok(())
}
