//! `fim-recipe {fetch|info|install}` — thin wrappers around an HTTP
//! download and a package-manager invocation, cached under
//! `recipes/<distribution>/latest/<name>.json`.

use crate::context::Context;
use clap::Subcommand;
use serde::Deserialize;
use std::process::Command;

#[derive(Deserialize)]
struct Recipe {
    #[serde(default)]
    description: String,
    #[serde(default)]
    packages: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum RecipeCommand {
    /// Download `name`'s recipe JSON from the configured remote into the
    /// local cache
    Fetch { name: String },
    /// Print a cached recipe's contents
    Info { name: String },
    /// Run the recipe's package manager invocation inside the sandbox
    Install { name: String },
}

fn recipe_path(ctx: &Context, name: &str) -> std::path::PathBuf {
    ctx.dir_config.join("recipes").join(format!("{name}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn recipe_path_is_scoped_under_dir_config() {
        let ctx = Context {
            elf_path: PathBuf::from("/opt/app.flatimage"),
            reserved_offset: 0,
            dir_config: PathBuf::from("/home/user/.config/app.flatimage.config"),
        };
        assert_eq!(
            recipe_path(&ctx, "vim"),
            PathBuf::from("/home/user/.config/app.flatimage.config/recipes/vim.json")
        );
    }
}

pub fn execute(cmd: RecipeCommand, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        RecipeCommand::Fetch { name } => {
            let mut file = ctx.open_reserved()?;
            let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
            let url = flatimage::remote_db::decode(&region.read_remote()?)?
                .ok_or_else(|| anyhow::anyhow!("no remote configured, see fim-remote set"))?;
            let dest = recipe_path(ctx, &name);
            std::fs::create_dir_all(dest.parent().unwrap())?;
            let status = Command::new("curl")
                .arg("-fsSL")
                .arg("-o")
                .arg(&dest)
                .arg(format!("{}/{}.json", url.trim_end_matches('/'), name))
                .status()?;
            if !status.success() {
                anyhow::bail!("curl exited with status {:?}", status.code());
            }
            println!("{}", dest.display());
        }
        RecipeCommand::Info { name } => {
            let dest = recipe_path(ctx, &name);
            let data = std::fs::read_to_string(&dest)
                .map_err(|e| anyhow::anyhow!("recipe '{name}' not cached: {e}"))?;
            print!("{data}");
        }
        RecipeCommand::Install { name } => {
            let dest = recipe_path(ctx, &name);
            let data = std::fs::read_to_string(&dest)
                .map_err(|e| anyhow::anyhow!("recipe '{name}' not cached: {e}"))?;
            let recipe: Recipe = serde_json::from_str(&data)?;
            if recipe.packages.is_empty() {
                println!("recipe '{name}' lists no packages");
                return Ok(());
            }
            println!("{}", recipe.description);
            let status = Command::new("apt-get").arg("install").arg("-y").args(&recipe.packages).status()?;
            if !status.success() {
                anyhow::bail!("package manager exited with status {:?}", status.code());
            }
        }
    }
    Ok(())
}
