//! Server lifecycle.
//!
//! Loads the blacklist, binds the listener and runs until the process is
//! stopped.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::filter::Blacklist;
use crate::resolver::{MAX_REFERRALS, Resolver};
use crate::stats::Stats;
use crate::transport::{SystemLookup, UdpConfig, UdpTransport, UdpUpstream};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the resolver.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local address to bind (e.g., 0.0.0.0:5300)
    pub bind_addr: SocketAddr,
    /// Blacklist file; `None` disables filtering
    pub blacklist: Option<PathBuf>,
    /// How long to wait for each name server's response
    pub upstream_timeout: Duration,
    /// Referral queries allowed after the root query
    pub max_referrals: usize,
    pub udp: UdpConfig,
}

impl ProxyConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            blacklist: None,
            upstream_timeout: Duration::from_secs(5),
            max_referrals: MAX_REFERRALS,
            udp: UdpConfig::default(),
        }
    }
}

/// Run the resolver with the given configuration.
///
/// Must be called inside a `LocalSet`. Only startup failures are returned;
/// once the listener is bound this runs indefinitely.
pub async fn run(config: ProxyConfig) -> Result<()> {
    let blacklist = config.blacklist.as_ref().map(Blacklist::load).transpose()?;

    let upstream = UdpUpstream::new(config.upstream_timeout);
    let resolver = Rc::new(
        Resolver::new(blacklist, upstream, SystemLookup).with_max_referrals(config.max_referrals),
    );

    let udp = UdpTransport::bind(config.bind_addr).await?;
    let stats = Arc::new(Stats::new());

    let addr = udp.local_addr()?;
    match resolver.blocked_count() {
        Some(count) => tracing::info!(%addr, blacklisted = count, "listening"),
        None => tracing::info!(%addr, "listening, blacklist disabled"),
    }

    udp.start(resolver, stats.clone(), config.udp);

    let mut interval = tokio::time::interval(STATS_INTERVAL);
    interval.tick().await; // Skip first immediate tick
    loop {
        interval.tick().await;
        let s = stats.snapshot_and_reset();
        tracing::info!(
            uptime_secs = s.uptime_secs,
            requests = s.requests,
            answered = s.answered,
            nxdomain = s.nxdomain,
            blocked = s.blocked,
            server_errors = s.server_errors,
            failed = s.failed,
            avg_response_ms = s.avg_response_ms,
            "stats"
        );
    }
}
