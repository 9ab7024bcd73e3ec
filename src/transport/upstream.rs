//! Upstream name server access.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time;

use crate::dns::MAX_UDP_MESSAGE;
use crate::error::{Error, Result};
use crate::resolver::{HostLookup, Upstream};

/// Port name servers listen on.
pub const DNS_PORT: u16 = 53;

/// Sends each query from a fresh UDP socket and waits for a single
/// response. The socket is dropped as soon as the exchange completes or
/// fails; nothing is reused between hops.
#[derive(Debug, Clone)]
pub struct UdpUpstream {
    port: u16,
    timeout: Duration,
}

impl UdpUpstream {
    pub fn new(timeout: Duration) -> Self {
        Self {
            port: DNS_PORT,
            timeout,
        }
    }

    /// Target a port other than 53 on every server.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl Upstream for UdpUpstream {
    async fn exchange(&self, query: &[u8], server: IpAddr) -> Result<Vec<u8>> {
        let local: SocketAddr = match server {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(SocketAddr::new(server, self.port)).await?;
        socket.send(query).await?;

        let mut buf = vec![0u8; MAX_UDP_MESSAGE];
        let len = time::timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "name server did not answer"))??;
        buf.truncate(len);

        Ok(buf)
    }
}

/// Looks host names up through the operating system's resolver.
///
/// Name server host names from referrals are resolved this way rather than
/// from glue records in the additional section.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;

impl HostLookup for SystemLookup {
    async fn lookup(&self, host: &str) -> Result<IpAddr> {
        let aborted = |source| Error::ResolutionAborted {
            host: host.to_string(),
            source,
        };

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, DNS_PORT))
            .await
            .map_err(|e| aborted(Some(e)))?
            .collect();

        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .map(SocketAddr::ip)
            .ok_or_else(|| aborted(None))
    }
}
