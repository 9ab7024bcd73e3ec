//! Client-facing UDP transport.
//!
//! Each received datagram is resolved in its own local task, so a slow
//! referral chain or a held server-error request does not stall the
//! listener. Tasks share nothing mutable: every one gets a copy of its
//! query, the read-only resolver, and the listening socket for its single
//! reply.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::dns::{self, HEADER_LEN, MAX_UDP_MESSAGE};
use crate::error::Error;
use crate::resolver::{HostLookup, NxCause, Outcome, Resolver, Upstream};
use crate::response::build_reply;
use crate::stats::Stats;

/// Default hold time for requests that ended in an upstream server error.
pub const SERVER_ERROR_STALL: Duration = Duration::from_secs(15);

/// Per-request handling settings.
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Upper bound on requests being resolved at once.
    pub max_in_flight: usize,
    /// How long a request that hit an upstream server error is held before
    /// it is dropped without a reply.
    pub server_error_stall: Duration,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            server_error_stall: SERVER_ERROR_STALL,
        }
    }
}

/// How a request was answered, for logging.
#[derive(Debug, Clone, Copy)]
enum Status {
    Answered,
    Blocked,
    NxDomain,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Status::Answered => "ANSWERED",
            Status::Blocked => "BLOCKED",
            Status::NxDomain => "NXDOMAIN",
        }
    }
}

/// UDP transport for the resolver.
///
/// Binds the listening socket that clients send queries to.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the UDP transport.
    ///
    /// Spawns the receive loop on the current `LocalSet`.
    pub fn start<U, L>(self, resolver: Rc<Resolver<U, L>>, stats: Arc<Stats>, config: UdpConfig)
    where
        U: Upstream + 'static,
        L: HostLookup + 'static,
    {
        tokio::task::spawn_local(run(self.socket, resolver, stats, config));
    }
}

/// Receive loop: one datagram at a time, one task per datagram.
async fn run<U, L>(socket: Arc<UdpSocket>, resolver: Rc<Resolver<U, L>>, stats: Arc<Stats>, config: UdpConfig)
where
    U: Upstream + 'static,
    L: HostLookup + 'static,
{
    let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
    let mut buf = [0u8; MAX_UDP_MESSAGE];

    loop {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            return;
        };

        let (len, client) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "UDP recv error");
                continue;
            }
        };

        if len < HEADER_LEN {
            tracing::debug!(%client, len, "dropping short datagram");
            continue;
        }

        tokio::task::spawn_local(handle_query(
            socket.clone(),
            resolver.clone(),
            stats.clone(),
            buf[..len].to_vec(),
            client,
            config.server_error_stall,
            permit,
        ));
    }
}

/// Resolve one query and send at most one reply.
///
/// The permit is held until the task finishes, including any stall.
async fn handle_query<U, L>(
    socket: Arc<UdpSocket>,
    resolver: Rc<Resolver<U, L>>,
    stats: Arc<Stats>,
    query: Vec<u8>,
    client: SocketAddr,
    server_error_stall: Duration,
    _permit: OwnedSemaphorePermit,
) where
    U: Upstream,
    L: HostLookup,
{
    let start_time = Instant::now();
    let id = dns::message_id(&query).unwrap_or_default();

    let outcome = match resolver.resolve(&query).await {
        Ok(outcome) => outcome,
        Err(Error::UpstreamServerError { rcode }) => {
            stats.record_server_error();
            tracing::warn!(
                %client,
                id,
                rcode,
                stall_secs = server_error_stall.as_secs(),
                "upstream server error, holding request"
            );
            tokio::time::sleep(server_error_stall).await;
            return;
        }
        Err(e) => {
            stats.record_failed();
            tracing::error!(%client, id, error = %e, "dropping request");
            return;
        }
    };

    let (reply, status) = match outcome {
        Outcome::Answered(response) => (build_reply(response, false, client), Status::Answered),
        Outcome::NxDomain(NxCause::Blacklisted) => (build_reply(query, true, client), Status::Blocked),
        Outcome::NxDomain(_) => (build_reply(query, true, client), Status::NxDomain),
    };

    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => {
            stats.record_failed();
            tracing::error!(%client, id, error = %e, "could not build reply");
            return;
        }
    };

    if let Err(e) = socket.send_to(&reply.data, reply.dest).await {
        stats.record_failed();
        tracing::error!(%client, id, error = %e, "UDP response error");
        return;
    }

    let elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    match status {
        Status::Answered => stats.record_answered(elapsed_ms),
        Status::Blocked => stats.record_blocked(elapsed_ms),
        Status::NxDomain => stats.record_nxdomain(elapsed_ms),
    }
    tracing::debug!(%client, id, status = status.as_str(), total_ms = elapsed_ms, "replied");
}
