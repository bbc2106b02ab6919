pub mod codec;
mod resolver;
pub mod transport;
pub mod types;

pub use codec::{DecodeError, EncodeError, decode_response, encode_query};
pub use resolver::{DnsResolver, ResolveError, Resolver, Stage};
pub use transport::{TransportError, exchange};
