//! `fim-overlay {set|show}` — overlay backend selection.

use crate::context::Context;
use clap::Subcommand;
use flatimage::reserved::OverlayByte;

#[derive(Subcommand, Debug)]
pub enum OverlayCommand {
    /// `stacking`, `overlayfs` or `unionfs`
    Set { backend: String },
    Show,
}

fn parse_backend(name: &str) -> anyhow::Result<OverlayByte> {
    match name {
        "stacking" => Ok(OverlayByte::Stacking),
        "overlayfs" => Ok(OverlayByte::OverlayFs),
        "unionfs" => Ok(OverlayByte::UnionFs),
        other => anyhow::bail!("unknown overlay backend '{other}'"),
    }
}

fn backend_name(value: OverlayByte) -> &'static str {
    match value {
        OverlayByte::Stacking => "stacking",
        OverlayByte::OverlayFs => "overlayfs",
        OverlayByte::UnionFs => "unionfs",
    }
}

pub fn execute(cmd: OverlayCommand, ctx: &Context) -> anyhow::Result<()> {
    let mut file = ctx.open_reserved()?;
    let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
    match cmd {
        OverlayCommand::Set { backend } => {
            let value = parse_backend(&backend)?;
            region.write_overlay(value)?;
            println!("{}", backend_name(value));
        }
        OverlayCommand::Show => {
            println!("{}", backend_name(region.read_overlay()?));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_backend_name() {
        assert_eq!(parse_backend("stacking").unwrap(), OverlayByte::Stacking);
        assert_eq!(parse_backend("overlayfs").unwrap(), OverlayByte::OverlayFs);
        assert_eq!(parse_backend("unionfs").unwrap(), OverlayByte::UnionFs);
    }

    #[test]
    fn rejects_unknown_backend_name() {
        assert!(parse_backend("zfs").is_err());
    }

    #[test]
    fn backend_name_round_trips_parse_backend() {
        for name in ["stacking", "overlayfs", "unionfs"] {
            assert_eq!(backend_name(parse_backend(name).unwrap()), name);
        }
    }
}
