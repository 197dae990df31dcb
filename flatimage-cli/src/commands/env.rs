//! `fim-env {add|del|set|clear|list}` — the stored environment contract.

use crate::context::Context;
use clap::Subcommand;
use flatimage::env_db;

#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// Add or overwrite a single `KEY=VALUE` assignment
    Add { entry: String },
    /// Remove a variable by key
    Del { key: String },
    /// Replace the whole environment with the given `KEY=VALUE` entries
    Set { entries: Vec<String> },
    /// Remove every stored variable
    Clear,
    /// Print every stored `KEY=VALUE` assignment
    List,
}

fn split_assignment(entry: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = entry
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("'{entry}' is not in KEY=VALUE form"))?;
    Ok((key.to_string(), value.to_string()))
}

pub fn execute(cmd: EnvCommand, ctx: &Context) -> anyhow::Result<()> {
    let mut file = ctx.open_reserved()?;
    let mut region = flatimage::reserved::ReservedRegion::new(&mut file, ctx.reserved_offset);
    let mut map = env_db::decode(&region.read_environment()?)?;

    match cmd {
        EnvCommand::Add { entry } => {
            let (key, value) = split_assignment(&entry)?;
            env_db::set(&mut map, &key, &value);
            region.write_environment(&env_db::encode(&map)?)?;
        }
        EnvCommand::Del { key } => {
            env_db::del(&mut map, &key);
            region.write_environment(&env_db::encode(&map)?)?;
        }
        EnvCommand::Set { entries } => {
            let mut map = env_db::EnvMap::new();
            for entry in &entries {
                let (key, value) = split_assignment(entry)?;
                env_db::set(&mut map, &key, &value);
            }
            region.write_environment(&env_db::encode(&map)?)?;
        }
        EnvCommand::Clear => {
            env_db::clear(&mut map);
            region.write_environment(&env_db::encode(&map)?)?;
        }
        EnvCommand::List => {
            for line in env_db::list(&map) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_key_and_value_on_first_equals() {
        let (k, v) = split_assignment("PATH=/usr/bin=extra").unwrap();
        assert_eq!(k, "PATH");
        assert_eq!(v, "/usr/bin=extra");
    }

    #[test]
    fn rejects_entry_without_equals() {
        assert!(split_assignment("NOVALUE").is_err());
    }
}
