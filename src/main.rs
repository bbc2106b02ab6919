mod cli;

use std::env;
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, exit};

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::Args;
use dns_reroute::config::DNS_ENV;
use log::{error, info};

const LIBRARY_NAME: &str = "libdns_reroute.so";
const PRELOAD_ENV: &str = "LD_PRELOAD";

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    // exec only returns on failure
    if let Err(e) = run(args) {
        error!("{e:#}");
        exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let resolver = match args.dns {
        Some(addr) => addr,
        None => {
            let Some(raw) = env::var_os(DNS_ENV) else {
                bail!("no resolver given, pass --dns or set the {DNS_ENV} environment variable");
            };
            raw.to_string_lossy()
                .trim()
                .parse()
                .with_context(|| format!("{DNS_ENV}={raw:?} is not an IPv4 address"))?
        }
    };

    let library = match args.library {
        Some(path) => path,
        None => default_library()?,
    };
    if !library.is_file() {
        bail!("interception library {} not found", library.display());
    }
    let library = library
        .canonicalize()
        .with_context(|| format!("resolving {}", library.display()))?;

    let preload = preload_value(&library, env::var_os(PRELOAD_ENV));

    info!("Resolver: {resolver}");
    info!("Preloading {}", library.display());
    info!("Executing {:?}", args.program);

    let err = Command::new(&args.program)
        .args(&args.args)
        .env(DNS_ENV, resolver.to_string())
        .env(PRELOAD_ENV, preload)
        .exec();

    Err(err).with_context(|| format!("failed to execute {:?}", args.program))
}

fn default_library() -> Result<PathBuf> {
    let exe = env::current_exe().context("cannot locate the launcher executable")?;
    let dir = exe
        .parent()
        .context("launcher executable has no parent directory")?;
    Ok(dir.join(LIBRARY_NAME))
}

/// Put `library` first, keeping whatever was already preloaded.
fn preload_value(library: &Path, existing: Option<OsString>) -> OsString {
    let mut value = library.as_os_str().to_owned();
    if let Some(existing) = existing.filter(|v| !v.is_empty()) {
        value.push(":");
        value.push(existing);
    }
    value
}
