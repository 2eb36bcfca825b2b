use clap::Parser;
use log::{info, warn};
use proxy::backend::{BackendRegistry, TcpBackend};
use proxy::config::ProxyConfig;
use proxy::network::StatusServer;
use proxy::state::ProxyState;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "relay.toml")]
    config: String,

    /// Address to bind to, overriding the configuration
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut config = ProxyConfig::load(&args.config)?;

    config.override_bind(args.host.as_deref(), args.port)?;
    let bind = config.bind_addr()?;

    let backends = Arc::new(BackendRegistry::new());
    for (name, addr) in &config.servers {
        let addr: SocketAddr = addr.parse()?;
        backends.register(Arc::new(TcpBackend::new(
            name.clone(),
            addr,
            config.probe_timeout(),
        )));
    }
    for name in &config.attempt_connection_order {
        if !config.servers.contains_key(name) {
            warn!("Server {} in the connection order is not configured", name);
        }
    }

    info!(
        "Starting with {} backends, ping passthrough {:?}",
        backends.len(),
        config.ping_passthrough
    );

    let state = Arc::new(ProxyState::new(config, backends));
    let server = StatusServer::bind(bind, state).await?;

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
