//! `fim-remote {set|show|clear}` — recipe repository base URL.

use crate::context::Context;
use clap::Subcommand;
use flatimage::remote_db;

#[derive(Subcommand, Debug)]
pub enum RemoteCommand {
    Set { url: String },
    Show,
    Clear,
}

pub fn execute(cmd: RemoteCommand, ctx: &Context) -> anyhow::Result<()> {
    let mut file = ctx.open_reserved()?;
    let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);

    match cmd {
        RemoteCommand::Set { url } => {
            region.write_remote(&remote_db::encode(&url)?)?;
            println!("{url}");
        }
        RemoteCommand::Show => match remote_db::decode(&region.read_remote()?)? {
            Some(url) => println!("{url}"),
            None => println!("(no remote configured)"),
        },
        RemoteCommand::Clear => {
            region.write_remote(&remote_db::encode("")?)?;
        }
    }
    Ok(())
}
