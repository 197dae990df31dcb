//! Environment contract consumed by every `fim-*` subcommand: the
//! booter exports `FIM_FILE_BINARY` and `FIM_OFFSET` so that tools invoked
//! inside the sandbox can reopen the packed ELF's reserved region, and
//! `FIM_DIR_CONFIG` for the bind/recipe/boot persistent state that lives
//! outside it.

use flatimage_shared::constants::env;
use std::path::PathBuf;

pub struct Context {
    pub elf_path: PathBuf,
    pub reserved_offset: u64,
    pub dir_config: PathBuf,
}

impl Context {
    pub fn from_env() -> anyhow::Result<Self> {
        let elf_path = read_var(env::FILE_BINARY)?.into();
        let reserved_offset = read_var(env::OFFSET)?
            .parse()
            .map_err(|_| anyhow::anyhow!("{} is not a valid integer", env::OFFSET))?;
        let dir_config = read_var(env::DIR_CONFIG)?.into();
        Ok(Context { elf_path, reserved_offset, dir_config })
    }

    pub fn open_reserved(&self) -> anyhow::Result<std::fs::File> {
        Ok(flatimage::reserved::open(&self.elf_path, self.reserved_offset)?)
    }
}

fn read_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{name} is not set — fim-* subcommands must run inside a booted flatimage instance"))
}
