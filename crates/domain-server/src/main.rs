//! domain-server: node directory daemon.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use domain_core::config::DomainConfig;
use domain_services::{new_registry, MetricsSink, TracingSink, UdpStatsSink};

use domain_server::net::{bind_udp, detect_host_address};
use domain_server::{LivenessReaper, ServerLoop, ServerSettings};

#[derive(Parser, Debug)]
#[command(name = "domain-server", about = "Node directory for a virtual-world domain")]
struct Args {
    /// Report co-located nodes by their real address instead of rewriting
    /// them. For running every node on one machine.
    #[arg(long)]
    local: bool,

    /// Assignment pool to request missing mixers from.
    #[arg(short = 'p', long)]
    pool: Option<String>,

    /// UDP check-in port.
    #[arg(long)]
    port: Option<u16>,

    /// HTTP status page port.
    #[arg(long)]
    status_port: Option<u16>,

    /// Config file; defaults to $DOMAIN_CONFIG or the XDG config dir.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> DomainConfig {
    let loaded = match path {
        Some(p) => DomainConfig::load_from(p),
        None => {
            if let Err(e) = DomainConfig::write_default_if_missing() {
                tracing::warn!(error = %e, "failed to write default config");
            }
            DomainConfig::load()
        }
    };
    loaded.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        DomainConfig::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = load_config(args.config.as_ref());
    if args.local {
        config.network.local_mode = true;
    }
    if args.pool.is_some() {
        config.assignment.pool = args.pool.clone();
    }
    if let Some(port) = args.port {
        config.network.udp_port = port;
    }
    if let Some(port) = args.status_port {
        config.network.status_port = port;
    }

    if config.network.local_mode {
        tracing::info!("local testing mode: co-located nodes keep their own address");
    } else {
        tracing::warn!("co-located nodes will be reported by this server's address");
    }
    if let Some(pool) = &config.assignment.pool {
        tracing::info!(pool, "assignment pool set");
    }

    let host_address = match config.network.host_address {
        Some(addr) => addr,
        None => detect_host_address().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "host address detection failed, assuming loopback");
            Ipv4Addr::LOCALHOST
        }),
    };
    tracing::info!(%host_address, "host address");

    let socket = Arc::new(
        bind_udp(config.network.udp_port).context("failed to bind domain server socket")?,
    );

    let registry = new_registry();

    let metrics: Arc<dyn MetricsSink> = match config.metrics.stats_host {
        Some(target) => match UdpStatsSink::new(target) {
            Ok(sink) => {
                tracing::info!(%target, "sending stats");
                Arc::new(sink)
            }
            Err(e) => {
                tracing::warn!(error = %e, "stats socket unavailable, logging stats instead");
                Arc::new(TracingSink)
            }
        },
        None => Arc::new(TracingSink),
    };

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────
    let mut tasks = tokio::task::JoinSet::new();

    tasks.spawn(
        ServerLoop::new(
            socket,
            registry.clone(),
            ServerSettings::from_config(&config, host_address),
            metrics,
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    tasks.spawn(
        LivenessReaper::new(
            registry.clone(),
            config.liveness.timeout(),
            config.liveness.check_interval(),
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    {
        let mut stop = shutdown_tx.subscribe();
        let state = domain_api::StatusState {
            registry: registry.clone(),
        };
        tasks.spawn(domain_api::serve(
            state,
            config.network.status_port,
            async move {
                let _ = stop.recv().await;
            },
        ));
    }

    // ── Wait for exit ────────────────────────────────────────────────────────
    // The first task to finish, for whatever reason, takes the rest down.
    let mut outcome = Ok(());
    if let Some(first) = tasks.join_next().await {
        match first {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "task failed");
                outcome = Err(e);
            }
            Err(e) => tracing::error!(error = %e, "task panicked"),
        }
    }
    let _ = shutdown_tx.send(());

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "task failed during shutdown"),
            Err(e) => tracing::error!(error = %e, "task panicked during shutdown"),
        }
    }
    tracing::info!("domain server stopped");

    outcome
}
