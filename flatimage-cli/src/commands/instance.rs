//! `fim-instance {exec|list}` — the portal dispatcher entry point (spec
//! §4.7): submit a command to a running guest/host daemon and relay
//! stdio/exit code.

use crate::context::Context;
use clap::Subcommand;
use flatimage::portal::dispatcher;
use flatimage_shared::constants::env;
use flatimage_shared::transport::Mode;

#[derive(Subcommand, Debug)]
pub enum InstanceCommand {
    /// Run `command` inside the guest (or host, with `--host`) namespace
    /// of the currently running instance
    Exec {
        #[arg(long)]
        host: bool,
        command: Vec<String>,
    },
    /// List live instances by PID under the global scratch root
    List,
}

pub fn execute(cmd: InstanceCommand, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        InstanceCommand::Exec { host, command } => {
            if command.is_empty() {
                anyhow::bail!("fim-instance exec requires a command");
            }
            let pid: u32 = std::env::var(env::PID)
                .map_err(|_| anyhow::anyhow!("{} is not set", env::PID))?
                .parse()?;
            let fifo_dir = std::env::var(env::DIR_INSTANCE)
                .map(|d| std::path::PathBuf::from(d).join("portal").join("fifo"))
                .map_err(|_| anyhow::anyhow!("{} is not set", env::DIR_INSTANCE))?;
            let mode = if host { Mode::Host } else { Mode::Guest };
            let environment: Vec<String> = std::env::vars().map(|(k, v)| format!("{k}={v}")).collect();
            let log = ctx.dir_config.join("portal.log");

            let mut stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            let code = dispatcher::dispatch(&fifo_dir, mode, pid, command, log, environment, &mut stdin, &mut stdout)?;
            std::process::exit(code);
        }
        InstanceCommand::List => {
            use flatimage_shared::layout::dirs;
            let app_root = std::path::Path::new(dirs::GLOBAL_ROOT).join(dirs::APP);
            let mut found = false;
            if let Ok(builds) = std::fs::read_dir(&app_root) {
                for build in builds.flatten() {
                    let instance_dir = build.path().join(dirs::INSTANCE);
                    let Ok(pids) = std::fs::read_dir(&instance_dir) else { continue };
                    for pid in pids.flatten() {
                        if pid.path().is_dir() {
                            found = true;
                            println!("{} {}", build.file_name().to_string_lossy(), pid.file_name().to_string_lossy());
                        }
                    }
                }
            }
            if !found {
                println!("(no instances running)");
            }
        }
    }
    Ok(())
}
