//! Redirects a program's hostname lookups to one chosen DNS server.
//!
//! Built as a `cdylib` and preloaded into the target, the library answers
//! `getaddrinfo` with its own A-record client ([`dns`]) talking to the server
//! named by the `DNS` environment variable, and refuses `gethostbyname` and
//! `getnameinfo` outright ([`intercept`]).

pub mod config;
pub mod dns;
pub mod intercept;
pub mod logging;

pub use config::{ConfigError, ResolverConfig};
pub use dns::{DnsResolver, ResolveError, Resolver};
