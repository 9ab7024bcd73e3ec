//! Transport layer.
//!
//! `udp` faces clients: it receives queries and sends replies on a bound
//! socket. `upstream` faces name servers: one ephemeral socket per
//! query/response exchange, plus host name lookup through the system
//! resolver.

pub mod udp;
pub mod upstream;

pub use udp::{UdpConfig, UdpTransport};
pub use upstream::{SystemLookup, UdpUpstream};
