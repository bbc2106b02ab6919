use std::ffi::OsString;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "dns-reroute")]
#[command(about = "Run a program with its DNS lookups sent to another server", long_about = None)]
pub struct Args {
    /// Resolver address; falls back to the DNS environment variable
    #[arg(long)]
    pub dns: Option<Ipv4Addr>,

    /// Library to preload; defaults to libdns_reroute.so beside this executable
    #[arg(long)]
    pub library: Option<PathBuf>,

    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Program to run
    pub program: OsString,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}
