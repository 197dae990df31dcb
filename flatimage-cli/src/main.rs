//! `fim` — command-line surface over the reserved region, the bind/env/boot
//! databases, and the sandbox launcher.

mod commands;
mod context;

use clap::{Parser, Subcommand};
use commands::{bind, boot, casefold, desktop, env, exec, instance, layer, notify, overlay, perms, recipe, remote, unshare};
use context::Context;

#[derive(Parser, Debug)]
#[command(name = "fim", version, about = "FlatImage self-mounting application container")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a program inside the sandbox
    Exec { command: Vec<String> },
    /// Run a program inside the sandbox as root
    Root { command: Vec<String> },
    #[command(subcommand)]
    Perms(perms::PermsCommand),
    #[command(subcommand)]
    Env(env::EnvCommand),
    #[command(subcommand)]
    Bind(bind::BindCommand),
    #[command(subcommand)]
    Layer(layer::LayerCommand),
    #[command(subcommand)]
    Notify(notify::NotifyCommand),
    #[command(subcommand)]
    Casefold(casefold::CasefoldCommand),
    #[command(subcommand)]
    Overlay(overlay::OverlayCommand),
    #[command(subcommand)]
    Unshare(unshare::UnshareCommand),
    #[command(subcommand)]
    Boot(boot::BootCommand),
    #[command(subcommand)]
    Desktop(desktop::DesktopCommand),
    #[command(subcommand)]
    Remote(remote::RemoteCommand),
    #[command(subcommand)]
    Recipe(recipe::RecipeCommand),
    #[command(subcommand)]
    Instance(instance::InstanceCommand),
    /// Print the image version
    Version,
    /// Print version, commit, distribution and build timestamp
    VersionFull,
    /// Print the versions of every bundled tool
    VersionDeps,
}

fn register_logging() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).with_ansi(false).try_init();
}

fn main() -> anyhow::Result<()> {
    register_logging();
    let cli = Cli::parse();

    let ctx = || Context::from_env();

    match cli.command {
        Some(Commands::Exec { command }) => exec::execute_exec(&ctx()?, command),
        Some(Commands::Root { command }) => exec::execute_root(&ctx()?, command),
        Some(Commands::Perms(cmd)) => perms::execute(cmd, &ctx()?),
        Some(Commands::Env(cmd)) => env::execute(cmd, &ctx()?),
        Some(Commands::Bind(cmd)) => bind::execute(cmd, &ctx()?),
        Some(Commands::Layer(cmd)) => layer::execute(cmd, &ctx()?),
        Some(Commands::Notify(cmd)) => notify::execute(cmd, &ctx()?),
        Some(Commands::Casefold(cmd)) => casefold::execute(cmd, &ctx()?),
        Some(Commands::Overlay(cmd)) => overlay::execute(cmd, &ctx()?),
        Some(Commands::Unshare(cmd)) => unshare::execute(cmd, &ctx()?),
        Some(Commands::Boot(cmd)) => boot::execute(cmd, &ctx()?),
        Some(Commands::Desktop(cmd)) => desktop::execute(cmd, &ctx()?),
        Some(Commands::Remote(cmd)) => remote::execute(cmd, &ctx()?),
        Some(Commands::Recipe(cmd)) => recipe::execute(cmd, &ctx()?),
        Some(Commands::Instance(cmd)) => instance::execute(cmd, &ctx()?),
        Some(Commands::Version) => {
            commands::version::version();
            Ok(())
        }
        Some(Commands::VersionFull) => {
            commands::version::version_full();
            Ok(())
        }
        Some(Commands::VersionDeps) => {
            commands::version::version_deps();
            Ok(())
        }
        None => exec::execute_default(&ctx()?),
    }
}
