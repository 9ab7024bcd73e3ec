//! Sinkhole - an iterative DNS resolver with a blacklist.
//!
//! Queries are resolved from the root servers down, following referrals,
//! and names on the blacklist are answered locally with NXDOMAIN.

pub mod dns;
pub mod error;
pub mod filter;
pub mod proxy;
pub mod resolver;
pub mod response;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
