//! `fim-notify {on|off}` — the "notify" record.

use crate::context::Context;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum NotifyCommand {
    On,
    Off,
}

pub fn execute(cmd: NotifyCommand, ctx: &Context) -> anyhow::Result<()> {
    let mut file = ctx.open_reserved()?;
    let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
    let value = matches!(cmd, NotifyCommand::On);
    region.write_notify(value)?;
    println!("{}", if value { "on" } else { "off" });
    Ok(())
}
