//! End-to-end tests over loopback UDP: a real listener, a real upstream
//! socket per hop, and a scripted name server standing in for the roots and
//! the delegated servers.

use std::cell::Cell;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::task::LocalSet;
use tokio::time::timeout;

use sinkhole::filter::Blacklist;
use sinkhole::resolver::{HostLookup, Resolver, Upstream};
use sinkhole::stats::Stats;
use sinkhole::transport::{UdpConfig, UdpTransport, UdpUpstream};
use sinkhole::Result;

fn encode_name(name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for label in name.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out
}

fn create_dns_query(query_id: u16, domain: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(512);

    packet.extend_from_slice(&query_id.to_be_bytes());
    packet.extend_from_slice(&[0x01, 0x00]); // Flags: standard query, RD
    packet.extend_from_slice(&[0x00, 0x01]); // Questions: 1
    packet.extend_from_slice(&[0x00, 0x00]); // Answer RRs: 0
    packet.extend_from_slice(&[0x00, 0x00]); // Authority RRs: 0
    packet.extend_from_slice(&[0x00, 0x00]); // Additional RRs: 0
    packet.extend_from_slice(&encode_name(domain));
    packet.extend_from_slice(&[0x00, 0x01]); // Type: A
    packet.extend_from_slice(&[0x00, 0x01]); // Class: IN

    packet
}

fn referral(query: &[u8], ns: &str) -> Vec<u8> {
    let mut msg = query.to_vec();
    msg[2] |= 0x80;
    msg[8..10].copy_from_slice(&1u16.to_be_bytes());
    let rdata = encode_name(ns);
    msg.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x02, 0x00, 0x01, 0x00, 0x02, 0xA3, 0x00]);
    msg.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    msg.extend_from_slice(&rdata);
    msg
}

fn answer(query: &[u8], rcode: u8, addr: [u8; 4]) -> Vec<u8> {
    let mut msg = query.to_vec();
    msg[2] |= 0x84; // QR | AA
    msg[3] = (msg[3] & 0xF0) | rcode;
    msg[6..8].copy_from_slice(&1u16.to_be_bytes());
    msg.extend_from_slice(&[0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x0E, 0x10, 0x00, 0x04]);
    msg.extend_from_slice(&addr);
    msg
}

/// Every host resolves to loopback, where the scripted name server runs.
struct LoopbackLookup;

impl HostLookup for LoopbackLookup {
    async fn lookup(&self, _host: &str) -> Result<IpAddr> {
        Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

/// Counts calls and never answers; used where the network must stay idle.
#[derive(Default)]
struct CountingUpstream {
    calls: Rc<Cell<usize>>,
}

impl Upstream for CountingUpstream {
    async fn exchange(&self, _query: &[u8], _server: IpAddr) -> Result<Vec<u8>> {
        self.calls.set(self.calls.get() + 1);
        Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into())
    }
}

/// Name server that refers the first query and answers the rest with
/// `rcode` and a single A record.
async fn spawn_name_server(rcode: u8) -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();

    tokio::task::spawn_local(async move {
        let mut buf = [0u8; 1024];
        let mut served = 0;
        loop {
            let (len, from) = socket.recv_from(&mut buf).await.unwrap();
            let query = &buf[..len];
            let response = if served == 0 {
                referral(query, "ns1.example.test")
            } else {
                answer(query, rcode, [192, 0, 2, 7])
            };
            served += 1;
            socket.send_to(&response, from).await.unwrap();
        }
    });

    port
}

async fn start<U: Upstream + 'static>(
    blacklist: Option<Blacklist>,
    upstream: U,
    config: UdpConfig,
) -> (SocketAddr, Arc<Stats>) {
    let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = transport.local_addr().unwrap();
    let stats = Arc::new(Stats::new());
    let resolver = Rc::new(Resolver::new(blacklist, upstream, LoopbackLookup));
    transport.start(resolver, stats.clone(), config);
    (addr, stats)
}

async fn ask(server: SocketAddr, query: &[u8], wait: Duration) -> Option<Vec<u8>> {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(query, server).await.unwrap();
    let mut buf = [0u8; 1024];
    match timeout(wait, client.recv_from(&mut buf)).await {
        Ok(Ok((len, from))) => {
            assert_eq!(from, server);
            Some(buf[..len].to_vec())
        }
        _ => None,
    }
}

/// Let handler tasks finish their bookkeeping after the reply went out.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn blacklisted_name_gets_nxdomain_without_upstream() {
    LocalSet::new()
        .run_until(async {
            let upstream = CountingUpstream::default();
            let calls = upstream.calls.clone();
            let (addr, stats) = start(
                Some(Blacklist::from_lines("ads.example.test\n")),
                upstream,
                UdpConfig::default(),
            )
            .await;

            let query = create_dns_query(0x5151, "ads.example.test");
            let reply = ask(addr, &query, Duration::from_secs(2)).await.unwrap();

            assert_eq!(reply[..2], [0x51, 0x51]);
            assert_eq!(reply[2], 0x81);
            assert_eq!(reply[3], 0x83);
            assert_eq!(reply[4..], query[4..]);
            assert_eq!(calls.get(), 0);
            settle().await;
            assert_eq!(stats.snapshot_and_reset().blocked, 1);
        })
        .await;
}

#[tokio::test]
async fn referral_chain_is_followed_to_answer() {
    LocalSet::new()
        .run_until(async {
            let port = spawn_name_server(0).await;
            let upstream = UdpUpstream::new(Duration::from_secs(2)).with_port(port);
            let (addr, _stats) = start(None, upstream, UdpConfig::default()).await;

            let query = create_dns_query(0x0102, "www.example.test");
            let reply = ask(addr, &query, Duration::from_secs(2)).await.unwrap();

            let expected = answer(&query, 0, [192, 0, 2, 7]);
            assert_eq!(reply[..2], [0x01, 0x02]);
            assert_eq!(reply[2], 0x81); // AA cleared
            assert_eq!(reply[3], 0x80);
            assert_eq!(reply[4..], expected[4..]);
        })
        .await;
}

#[tokio::test]
async fn server_error_gets_no_reply() {
    LocalSet::new()
        .run_until(async {
            let port = spawn_name_server(2).await;
            let upstream = UdpUpstream::new(Duration::from_secs(2)).with_port(port);
            let config = UdpConfig {
                server_error_stall: Duration::from_millis(20),
                ..UdpConfig::default()
            };
            let (addr, stats) = start(None, upstream, config).await;

            let query = create_dns_query(0x0303, "broken.example.test");
            let reply = ask(addr, &query, Duration::from_millis(500)).await;

            assert!(reply.is_none());
            assert_eq!(stats.snapshot_and_reset().server_errors, 1);
        })
        .await;
}

#[tokio::test]
async fn server_error_stall_holds_its_slot() {
    LocalSet::new()
        .run_until(async {
            let port = spawn_name_server(2).await;
            let upstream = UdpUpstream::new(Duration::from_secs(2)).with_port(port);
            let stall = Duration::from_millis(300);
            let config = UdpConfig {
                max_in_flight: 1,
                server_error_stall: stall,
            };
            let (addr, stats) = start(Some(Blacklist::from_lines("blocked.test")), upstream, config).await;

            let started = Instant::now();
            let stalled = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            stalled
                .send_to(&create_dns_query(0x0404, "broken.example.test"), addr)
                .await
                .unwrap();
            let blocked = ask(addr, &create_dns_query(0x0405, "blocked.test"), Duration::from_secs(2)).await;

            assert_eq!(blocked.unwrap()[..2], [0x04, 0x05]);
            assert!(started.elapsed() >= stall);
            settle().await;
            let snapshot = stats.snapshot_and_reset();
            assert_eq!(snapshot.server_errors, 1);
            assert_eq!(snapshot.blocked, 1);
        })
        .await;
}

#[tokio::test]
async fn listener_survives_failed_requests() {
    LocalSet::new()
        .run_until(async {
            let upstream = CountingUpstream::default();
            let calls = upstream.calls.clone();
            let (addr, stats) = start(
                Some(Blacklist::from_lines("blocked.test")),
                upstream,
                UdpConfig::default(),
            )
            .await;

            let failed = ask(addr, &create_dns_query(1, "fails.test"), Duration::from_millis(200)).await;
            let blocked = ask(addr, &create_dns_query(2, "blocked.test"), Duration::from_secs(2)).await;

            assert!(failed.is_none());
            assert_eq!(blocked.unwrap()[3] & 0x0F, 3);
            assert_eq!(calls.get(), 1);
            settle().await;
            let snapshot = stats.snapshot_and_reset();
            assert_eq!(snapshot.failed, 1);
            assert_eq!(snapshot.blocked, 1);
        })
        .await;
}
