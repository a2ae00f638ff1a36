use clap::Parser;
use scwdns::config::Config;
use scwdns::handler::{Forwarder, Handler};
use scwdns::provider::{Credentials, ScalewayClient};
use scwdns::server::{run_tcp_server, run_udp_server};
use scwdns::shutdown::Shutdown;
use scwdns::{AuthoritySettings, ScalewayAuthority};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Authoritative DNS server for zones hosted on Scaleway Domains
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Zone to serve; may be repeated (replaces configured zones)
    #[arg(short, long = "zone")]
    zones: Vec<String>,

    /// Log filter, e.g. `info` or `scwdns=debug` (defaults to RUST_LOG, then info)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if !args.zones.is_empty() {
        config.server.zones = args.zones.clone();
    }
    config.validate()?;

    // Settings file, then SCW_* environment, then the scw CLI profile
    let credentials = config.credentials().or(Credentials::load_profile()?);
    let provider = Arc::new(ScalewayClient::new(credentials, config.provider_timeout())?);

    let settings: AuthoritySettings = config.authority_settings()?;
    let mut authority = ScalewayAuthority::new(settings, provider);
    if let Some(upstream) = config.forward.upstream {
        info!("Forwarding unanswered queries to {}", upstream);
        authority = authority.with_next(Arc::new(Forwarder::new(upstream, config.forward_timeout())));
    }
    let authority = Arc::new(authority);

    // Queries are only accepted once every zone has loaded once
    if let Err(e) = authority.start().await {
        error!("Initial zone load failed: {}", e);
        return Err(e.into());
    }

    let bind_addr = config.server.bind_addr;
    let udp_socket = UdpSocket::bind(bind_addr).await?;
    let tcp_listener = TcpListener::bind(bind_addr).await?;

    let shutdown = Shutdown::new();
    let handler: Arc<dyn Handler> = authority.clone();
    let udp_task = tokio::spawn(run_udp_server(
        udp_socket,
        Arc::clone(&handler),
        shutdown.subscribe(),
    ));
    let tcp_task = tokio::spawn(run_tcp_server(tcp_listener, handler, shutdown.subscribe()));

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    shutdown.trigger();
    authority.stop().await;
    for (name, task) in [("UDP", udp_task), ("TCP", tcp_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("{} server error: {}", name, e),
            Err(e) => error!("{} server task failed: {}", name, e),
        }
    }

    info!("Shutdown complete");
    Ok(())
}
