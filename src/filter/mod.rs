//! Query filtering against a blacklist of domain names.
//!
//! Queries whose question name is on the blacklist never leave the proxy;
//! they are answered locally with NXDOMAIN.

mod blacklist;

pub use blacklist::Blacklist;

use crate::dns;
use crate::error::Result;

/// Filtering decision for one query. Both variants carry the question
/// name as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed(Vec<u8>),
    Blocked(Vec<u8>),
}

impl Verdict {
    pub fn name(&self) -> &[u8] {
        match self {
            Verdict::Allowed(name) | Verdict::Blocked(name) => name,
        }
    }
}

/// Decode the question name of `query` and check it against `blacklist`.
///
/// With no blacklist configured every query is allowed; the name is still
/// decoded so a malformed query is rejected either way.
pub fn filter_query(blacklist: Option<&Blacklist>, query: &[u8]) -> Result<Verdict> {
    let name = dns::question_name(query)?;

    match blacklist {
        Some(list) if list.is_blocked(&name) => Ok(Verdict::Blocked(name)),
        _ => Ok(Verdict::Allowed(name)),
    }
}
