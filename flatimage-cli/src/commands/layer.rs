//! `fim-layer {create|add|commit|list}` — layer chain / layer commit.
//! layer commit.

use crate::context::Context;
use clap::Subcommand;
use flatimage::commit::{self, CommitOptions, CommitTarget};
use flatimage::layers;
use flatimage_shared::constants::{env, DEFAULT_COMPRESSION_LEVEL};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum LayerCommand {
    /// Build a standalone layer file from a directory, without touching it
    Create {
        source: PathBuf,
        dest: PathBuf,
        #[arg(long)]
        level: Option<u8>,
    },
    /// Append an existing standalone layer file to the running image
    Add { layer: PathBuf },
    /// Snapshot the writable upper directory into a new layer appended to
    /// the running image
    Commit {
        #[arg(long)]
        level: Option<u8>,
    },
    /// List every layer in the discovered chain (embedded, then external)
    List,
}

fn compression_level(requested: Option<u8>) -> u8 {
    requested
        .or_else(|| std::env::var(env::COMPRESSION_LEVEL).ok().and_then(|s| s.parse().ok()))
        .unwrap_or(DEFAULT_COMPRESSION_LEVEL)
        .min(9)
}

pub fn execute(cmd: LayerCommand, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        LayerCommand::Create { source, dest, level } => {
            let opts = CommitOptions {
                upper: source,
                elf_path: ctx.elf_path.clone(),
                target: CommitTarget::StandaloneFile(&dest),
                level: compression_level(level),
                compressor: "mkdwarfs",
            };
            let written = commit::create_layer_file(&opts)?;
            println!("{}", written.display());
        }
        LayerCommand::Add { layer } => {
            commit::add_existing_layer(&ctx.elf_path, &layer)?;
            println!("{}", layer.display());
        }
        LayerCommand::Commit { level } => {
            let upper = ctx
                .dir_config
                .parent()
                .map(|p| p.join("upperdir"))
                .ok_or_else(|| anyhow::anyhow!("cannot resolve upper directory from config path"))?;
            let opts = CommitOptions {
                upper,
                elf_path: ctx.elf_path.clone(),
                target: CommitTarget::SelfAppend,
                level: compression_level(level),
                compressor: "mkdwarfs",
            };
            let written = commit::commit(&opts)?;
            println!("{}", written.display());
        }
        LayerCommand::List => {
            let chain_start = ctx.reserved_offset + flatimage::reserved::offsets::TOTAL_SIZE;
            let (embedded, chain_end) = layers::discover_embedded(&ctx.elf_path, chain_start)?;
            for source in &embedded {
                match source {
                    layers::LayerSource::Embedded { offset, size, .. } => {
                        println!("embedded offset={offset} size={size}");
                    }
                    layers::LayerSource::External { file } => {
                        println!("external {}", file.display());
                    }
                }
            }
            let dirs_layer = std::env::var(env::DIRS_LAYER).ok();
            let files_layer = std::env::var(env::FILES_LAYER).ok();
            for source in layers::discover_external(dirs_layer.as_deref(), files_layer.as_deref())? {
                if let layers::LayerSource::External { file } = source {
                    println!("external {}", file.display());
                }
            }
            let _ = chain_end;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_level_wins_over_default() {
        assert_eq!(compression_level(Some(3)), 3);
    }

    #[test]
    fn missing_level_falls_back_to_default() {
        assert_eq!(compression_level(None), DEFAULT_COMPRESSION_LEVEL);
    }

    #[test]
    fn level_is_capped_at_nine() {
        assert_eq!(compression_level(Some(15)), 9);
    }
}
