use std::net::Ipv4Addr;
use std::time::Duration;

use thiserror::Error;

/// Environment variable naming the resolver's IPv4 address.
pub const DNS_ENV: &str = "DNS";
/// Optional receive timeout in milliseconds; `0` blocks forever.
pub const TIMEOUT_ENV: &str = "DNS_TIMEOUT_MS";

pub const DNS_PORT: u16 = 53;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no resolver configured, set the DNS environment variable")]
    Missing,
    #[error("DNS={0:?} is not a dotted-decimal IPv4 address")]
    InvalidAddress(String),
    #[error("DNS_TIMEOUT_MS={0:?} is not a number of milliseconds")]
    InvalidTimeout(String),
}

/// Where queries go. Built once and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    pub addr: Ipv4Addr,
    pub port: u16,
    /// `None` keeps the receive blocking until a datagram arrives.
    pub timeout: Option<Duration>,
}

impl ResolverConfig {
    pub fn new(addr: Ipv4Addr) -> Self {
        Self {
            addr,
            port: DNS_PORT,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source shaped like the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(DNS_ENV).ok_or(ConfigError::Missing)?;
        let addr = raw
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|_| ConfigError::InvalidAddress(raw.clone()))?;

        let timeout = match lookup(TIMEOUT_ENV) {
            None => Some(DEFAULT_TIMEOUT),
            Some(value) => match value.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(ms) => Some(Duration::from_millis(ms)),
                Err(_) => return Err(ConfigError::InvalidTimeout(value)),
            },
        };

        Ok(Self::new(addr).with_timeout(timeout))
    }
}
