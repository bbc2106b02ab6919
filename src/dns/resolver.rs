use std::fmt;
use std::net::Ipv4Addr;

use log::debug;
use thiserror::Error;

use super::codec::{self, DecodeError, EncodeError};
use super::transport::{self, TransportError};
use crate::config::ResolverConfig;

/// Turns a hostname into one IPv4 address.
///
/// The interception layer only talks to this trait, so anything that can
/// answer A lookups may be registered in place of [`DnsResolver`].
pub trait Resolver: Send + Sync {
    fn resolve(&self, hostname: &str) -> Result<Ipv4Addr, ResolveError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Encode,
    Transport,
    Decode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => f.write_str("encode"),
            Self::Transport => f.write_str("transport"),
            Self::Decode => f.write_str("decode"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ResolveError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Encode(_) => Stage::Encode,
            Self::Transport(_) => Stage::Transport,
            Self::Decode(_) => Stage::Decode,
        }
    }
}

/// Plain UDP client against the single configured server.
///
/// Holds nothing but the immutable config, so one instance can serve any
/// number of threads. Nothing is cached: every call is a fresh round trip.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    config: ResolverConfig,
}

impl DnsResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }
}

impl Resolver for DnsResolver {
    fn resolve(&self, hostname: &str) -> Result<Ipv4Addr, ResolveError> {
        let query = codec::encode_query(hostname)?;
        let response = transport::exchange(&self.config, &query)?;
        let addr = codec::decode_response(&response)?;
        debug!("{hostname} -> {addr} via {}", self.config.addr);
        Ok(addr)
    }
}
