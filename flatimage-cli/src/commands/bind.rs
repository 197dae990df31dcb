//! `fim-bind {add|del|list}` — user-defined bindings.

use crate::context::Context;
use clap::Subcommand;
use flatimage::binds_db;
use flatimage::jailer::config::{BindEntry, BindKind};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum BindCommand {
    /// Bind a host path into the sandbox: `ro`, `rw` or `dev`
    Add {
        #[arg(value_enum)]
        kind: BindKindArg,
        src: PathBuf,
        dst: PathBuf,
    },
    /// Remove the binding targeting `dst`
    Del { dst: PathBuf },
    /// Print every stored binding
    List,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum BindKindArg {
    Ro,
    Rw,
    Dev,
}

impl From<BindKindArg> for BindKind {
    fn from(value: BindKindArg) -> Self {
        match value {
            BindKindArg::Ro => BindKind::Ro,
            BindKindArg::Rw => BindKind::Rw,
            BindKindArg::Dev => BindKind::Dev,
        }
    }
}

pub fn execute(cmd: BindCommand, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        BindCommand::Add { kind, src, dst } => {
            binds_db::add(&ctx.dir_config, BindEntry { kind: kind.into(), src, dst: dst.clone() })?;
            println!("{}", dst.display());
        }
        BindCommand::Del { dst } => {
            if !binds_db::del(&ctx.dir_config, &dst)? {
                anyhow::bail!("no binding for '{}'", dst.display());
            }
            println!("{}", dst.display());
        }
        BindCommand::List => {
            for entry in binds_db::load(&ctx.dir_config)? {
                println!("{:?} {} -> {}", entry.kind, entry.src.display(), entry.dst.display());
            }
        }
    }
    Ok(())
}
