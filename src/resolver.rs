//! Iterative query resolution.
//!
//! Handles the query processing pipeline:
//! 1. Filter (answer blacklisted names with NXDOMAIN locally)
//! 2. Query a random root server
//! 3. Follow authority referrals until an answer, an error or the
//!    referral bound
//!
//! The client's query bytes are forwarded unchanged at every hop. Network
//! access goes through the [`Upstream`] and [`HostLookup`] traits so
//! transports handle the actual I/O and the resolver only makes decisions.

use std::future::Future;
use std::net::IpAddr;

use rand::Rng;

use crate::dns;
use crate::error::{Error, Result};
use crate::filter::{Blacklist, Verdict, filter_query};

/// Referral queries allowed after the root query.
pub const MAX_REFERRALS: usize = 16;

const ROOT_SERVERS_DOMAIN: &str = "root-servers.net";

/// Sends a query to a name server and waits for one response.
pub trait Upstream {
    fn exchange(&self, query: &[u8], server: IpAddr) -> impl Future<Output = Result<Vec<u8>>>;
}

/// Resolves a name server's host name to an address.
///
/// Failures are reported as [`Error::ResolutionAborted`].
pub trait HostLookup {
    fn lookup(&self, host: &str) -> impl Future<Output = Result<IpAddr>>;
}

/// How a resolution ended, when it ended with something to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The final upstream response, to be relayed to the client.
    Answered(Vec<u8>),
    /// The client gets NXDOMAIN built from its own query.
    NxDomain(NxCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NxCause {
    Blacklisted,
    NoAnswer,
    /// The referral bound was reached while still being referred.
    Exhausted,
}

/// Classification of a single upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// NOERROR, no answers, at least one authority record.
    Referral,
    /// No answers and nothing to follow.
    NoAnswer,
    /// Answers present alongside a non-zero RCODE.
    ServerError(u8),
    Answered,
}

/// Classify an upstream response.
///
/// A response without answers is never a server error: an upstream
/// NXDOMAIN reaches the client as NXDOMAIN.
pub fn classify(response: &[u8]) -> Result<Step> {
    let rcode = dns::response_code(response)?;
    let answers = dns::answer_count(response)?;
    let authorities = dns::authority_count(response)?;

    Ok(if answers == 0 {
        if rcode == dns::RCODE_NOERROR && authorities > 0 {
            Step::Referral
        } else {
            Step::NoAnswer
        }
    } else if rcode != dns::RCODE_NOERROR {
        Step::ServerError(rcode)
    } else {
        Step::Answered
    })
}

/// Host name of a root server chosen uniformly from `a` to `m`.
pub fn random_root_server() -> String {
    let letter = rand::rng().random_range(b'a'..=b'm');
    format!("{}.{}", char::from(letter), ROOT_SERVERS_DOMAIN)
}

/// Resolver drives one query from the client to a terminal outcome.
///
/// It holds only read-only state, so one instance serves every request.
pub struct Resolver<U, L> {
    blacklist: Option<Blacklist>,
    upstream: U,
    lookup: L,
    max_referrals: usize,
}

impl<U: Upstream, L: HostLookup> Resolver<U, L> {
    /// Create a resolver. With no blacklist, filtering is skipped entirely.
    pub fn new(blacklist: Option<Blacklist>, upstream: U, lookup: L) -> Self {
        Self {
            blacklist,
            upstream,
            lookup,
            max_referrals: MAX_REFERRALS,
        }
    }

    pub fn with_max_referrals(mut self, max_referrals: usize) -> Self {
        self.max_referrals = max_referrals;
        self
    }

    /// Returns the number of names in the blacklist, if one is loaded.
    pub fn blocked_count(&self) -> Option<usize> {
        self.blacklist.as_ref().map(Blacklist::len)
    }

    /// Resolve a raw client query.
    ///
    /// Errors mean the client gets no reply at all. An
    /// [`Error::UpstreamServerError`] is the caller's cue to hold the
    /// request before dropping it.
    pub async fn resolve(&self, query: &[u8]) -> Result<Outcome> {
        let verdict = filter_query(self.blacklist.as_ref(), query)?;
        let name = String::from_utf8_lossy(verdict.name()).into_owned();
        if let Verdict::Blocked(_) = verdict {
            tracing::debug!(%name, "blacklisted");
            return Ok(Outcome::NxDomain(NxCause::Blacklisted));
        }

        let root = random_root_server();
        let server = self.lookup.lookup(&root).await?;
        tracing::debug!(%name, %root, %server, "querying root server");
        let mut response = self.upstream.exchange(query, server).await?;
        let mut referrals = 0;

        loop {
            match classify(&response)? {
                Step::Referral if referrals < self.max_referrals => {
                    let host = dns::first_authority_name(&response)?;
                    let server = self.lookup.lookup(&host).await?;
                    referrals += 1;
                    tracing::debug!(%name, %host, %server, referrals, "following referral");
                    response = self.upstream.exchange(query, server).await?;
                }
                Step::Referral => {
                    tracing::warn!(%name, referrals, "referral limit reached");
                    return Ok(Outcome::NxDomain(NxCause::Exhausted));
                }
                Step::NoAnswer => return Ok(Outcome::NxDomain(NxCause::NoAnswer)),
                Step::ServerError(rcode) => return Err(Error::UpstreamServerError { rcode }),
                Step::Answered => return Ok(Outcome::Answered(response)),
            }
        }
    }
}
