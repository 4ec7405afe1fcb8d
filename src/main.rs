use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use role_probe::action::{ActionChain, ChainConfig};
use role_probe::config::{self, Config};
use role_probe::health::RoleHealthService;
use role_probe::metrics;
use role_probe::observer::{ObserverSettings, RoleObserver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let mut config = load_or_default_config();
    config::apply_env_overrides(&mut config);

    let settings = ObserverSettings::from(&config.observer);
    let chain = ActionChain::new(ChainConfig::from(&config.action));

    info!(
        ports = ?chain.ports(),
        failure_log_modulus = settings.failure_log_modulus(),
        unchanged_notify_threshold = settings.unchanged_notify_threshold(),
        refresh_interval = settings.refresh_interval(),
        probe_timeout = ?settings.probe_timeout(),
        "Role observer configured"
    );

    let shutdown = CancellationToken::new();
    let observer = Arc::new(RoleObserver::new(chain, settings));
    let service = RoleHealthService::new(observer.clone(), shutdown.clone());

    if config.metrics.enabled {
        let metrics_addr = config.metrics.listen_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(&metrics_addr).await {
                error!(error = %e, "Metrics server stopped");
            }
        });
    }

    let addr: SocketAddr = config.server.addr().parse()?;
    info!(addr = %addr, "Role probe health service listening");

    let signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        signal.cancel();
    });

    let served = tonic::transport::Server::builder()
        .add_service(service.into_server())
        .serve_with_shutdown(addr, shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    observer.source().close_idle_connections();

    let snapshot = observer.snapshot().await;
    info!(
        role = %snapshot.current_role,
        consecutive_failures = snapshot.consecutive_failures,
        "Role probe stopped"
    );

    served?;
    Ok(())
}

fn load_or_default_config() -> Config {
    // Try to load from config file
    let config_paths = ["config/role-probe.toml", "role-probe.toml"];

    for path in config_paths {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return config;
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to load config");
            }
        }
    }

    info!("Using default configuration");
    Config::default()
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }
}
