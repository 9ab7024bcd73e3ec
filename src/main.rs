use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use sinkhole::proxy::{self, ProxyConfig};
use sinkhole::resolver::MAX_REFERRALS;
use sinkhole::transport::UdpConfig;

#[derive(Parser)]
#[command(name = "sinkhole")]
#[command(about = "Iterative DNS resolver with a blacklist sinkhole", long_about = None)]
struct Args {
    /// File with one blocked domain name per line
    blacklist: Option<PathBuf>,

    /// Local port to listen on
    #[arg(short, long, default_value = "5300")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// How long to wait for each name server, in milliseconds
    #[arg(long, default_value = "5000")]
    upstream_timeout_ms: u64,

    /// Referral queries allowed after the root query
    #[arg(long, default_value_t = MAX_REFERRALS)]
    max_referrals: usize,

    /// How long to hold a request after an upstream server error, in seconds
    #[arg(long, default_value = "15")]
    server_error_stall_secs: u64,

    /// Maximum number of requests resolved at once
    #[arg(long, default_value = "64")]
    max_in_flight: usize,

    /// Log every request
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> sinkhole::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = ProxyConfig {
        blacklist: args.blacklist,
        upstream_timeout: Duration::from_millis(args.upstream_timeout_ms),
        max_referrals: args.max_referrals,
        udp: UdpConfig {
            max_in_flight: args.max_in_flight,
            server_error_stall: Duration::from_secs(args.server_error_stall_secs),
        },
        ..ProxyConfig::new(SocketAddr::new(args.bind, args.port))
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, proxy::run(config))
}
