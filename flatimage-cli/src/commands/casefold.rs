//! `fim-casefold {on|off}` — the "casefold" record / ciopfs layer.

use crate::context::Context;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum CasefoldCommand {
    On,
    Off,
}

pub fn execute(cmd: CasefoldCommand, ctx: &Context) -> anyhow::Result<()> {
    let mut file = ctx.open_reserved()?;
    let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
    let value = matches!(cmd, CasefoldCommand::On);
    region.write_casefold(value)?;
    println!("{}", if value { "on" } else { "off" });
    Ok(())
}
