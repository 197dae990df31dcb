//! `fim-boot {set|show|clear}` — default program launched when `fim` runs
//! with no subcommand.

use crate::context::Context;
use clap::Subcommand;
use flatimage::boot_db::{self, BootRecord};

#[derive(Subcommand, Debug)]
pub enum BootCommand {
    /// Set the default program and its arguments
    Set {
        program: String,
        args: Vec<String>,
    },
    Show,
    Clear,
}

pub fn execute(cmd: BootCommand, ctx: &Context) -> anyhow::Result<()> {
    let mut file = ctx.open_reserved()?;
    let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);

    match cmd {
        BootCommand::Set { program, args } => {
            let record = BootRecord { program, args };
            region.write_boot(&boot_db::encode(&record)?)?;
            println!("{} {}", record.program, record.args.join(" "));
        }
        BootCommand::Show => {
            let record = boot_db::decode(&region.read_boot()?)?;
            if record.program.is_empty() {
                println!("(no default program set, falls back to bash)");
            } else {
                println!("{} {}", record.program, record.args.join(" "));
            }
        }
        BootCommand::Clear => {
            region.write_boot(&boot_db::encode(&BootRecord::default())?)?;
        }
    }
    Ok(())
}
