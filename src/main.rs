use std::sync::Arc;

use clap::Parser;
use kube::{Client, CustomResourceExt};
use prometheus_client::registry::Registry;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use identity_sync_operator::config::OperatorConfig;
use identity_sync_operator::controller::{run_controller, ControllerState, PrometheusRecorder};
use identity_sync_operator::crd::IdentitySyncPolicy;
use identity_sync_operator::rest_api::run_server;
use identity_sync_operator::throttle::LogRateLimiter;
use identity_sync_operator::{Error, Result};

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
    };

    result.map_err(|e| Error::ConfigError(format!("Failed to initialize logging: {}", e)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = OperatorConfig::parse();

    if config.print_crd {
        let crd = serde_yaml::to_string(&IdentitySyncPolicy::crd())
            .map_err(|e| Error::ConfigError(format!("Failed to render CRD: {}", e)))?;
        print!("{}", crd);
        return Ok(());
    }

    init_tracing(config.log_json)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting identity sync operator"
    );

    let client = Client::try_default().await?;

    let mut registry = Registry::default();
    let recorder = PrometheusRecorder::new(&mut registry);
    let registry = Arc::new(registry);

    let state = Arc::new(ControllerState {
        client,
        limiter: Arc::new(LogRateLimiter::new(config.log_limiter_capacity)),
        recorder: Arc::new(recorder),
        settings: config.reconcile_settings(),
    });

    tokio::select! {
        res = run_controller(state) => {
            if let Err(e) = &res {
                error!("Controller stopped: {}", e);
            }
            res?;
            info!("Controller shut down");
        }
        res = run_server(config.metrics_addr, registry) => {
            if let Err(e) = &res {
                error!("HTTP server stopped: {}", e);
            }
            res?;
        }
    }

    Ok(())
}
