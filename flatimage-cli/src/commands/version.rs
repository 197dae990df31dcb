//! `fim-version{|-full|-deps}` — printed from the `FIM_*` build-identity
//! environment contract, exported by the booter from the ELF's
//! embedded commit/timestamp/distribution.

use flatimage_shared::constants::env;

fn var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| "unknown".to_string())
}

pub fn version() {
    println!("{}", var(env::VERSION));
}

pub fn version_full() {
    println!(
        "version={} commit={} dist={} timestamp={}",
        var(env::VERSION),
        var(env::COMMIT),
        var(env::DIST),
        var(env::TIMESTAMP),
    );
}

pub fn version_deps() {
    println!("flatimage-cli {}", env!("CARGO_PKG_VERSION"));
    println!("flatimage {}", env!("CARGO_PKG_VERSION"));
}
