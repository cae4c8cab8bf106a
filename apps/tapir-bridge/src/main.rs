//! Tapir identity event bridge
//!
//! Consumes identity provider events and applies them to the legacy tapir
//! MySQL store until Ctrl+C or SIGTERM.

mod logging;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::mysql::MySqlPoolOptions;
use tapir_bridge::{
    BridgeConfig, BridgeError, EventBridge, HandlerRegistry, MessageSource, MySqlLegacyStore,
};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "tapir-bridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(long, env = "BRIDGE_DEBUG")]
    debug: bool,

    /// Downstream request timeout in seconds
    #[arg(long, env = "BRIDGE_REQUEST_TIMEOUT_SECS")]
    timeout: Option<u64>,

    /// Identity realm whose events are applied
    #[arg(long, env = "BRIDGE_REALM")]
    realm: Option<String>,

    /// Legacy store connection string
    #[arg(long, env = "CLASSIC_DB_URI", hide_env_values = true)]
    db_uri: String,
}

fn load_config(cli: &Cli) -> Result<BridgeConfig, BridgeError> {
    let mut config = BridgeConfig::from_env()?;
    if let Some(realm) = &cli.realm {
        config.realm.clone_from(realm);
    }
    if let Some(secs) = cli.timeout {
        config.request_timeout = Duration::from_secs(secs);
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "kafka")]
fn message_source() -> Result<Arc<dyn MessageSource>, BridgeError> {
    let config = tapir_bridge::KafkaConfig::from_env()?;
    Ok(Arc::new(tapir_bridge::kafka::KafkaSource::new(&config)?))
}

#[cfg(not(feature = "kafka"))]
fn message_source() -> Result<Arc<dyn MessageSource>, BridgeError> {
    Err(BridgeError::ConfigInvalid {
        var: "KAFKA_BOOTSTRAP_SERVERS".to_string(),
        reason: "binary built without the kafka feature".to_string(),
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(logging::default_filter(cli.debug));

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let source = match message_source() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let pool = match MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&cli.db_uri)
        .await
    {
        Ok(pool) => {
            info!("Database connection established");
            pool
        }
        Err(e) => {
            eprintln!("Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };

    info!(
        realm = %config.realm,
        max_in_flight = config.max_in_flight,
        forwarding = config.forward.is_some(),
        source = source.name(),
        "Starting event bridge"
    );

    let store = Arc::new(MySqlLegacyStore::new(pool));
    let bridge = match EventBridge::new(config, HandlerRegistry::standard(), store) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let stopper = bridge.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        stopper.stop();
    });

    match bridge.run(source).await {
        Ok(report) => {
            for failure in &report.fatal_failures {
                warn!(
                    message_id = %failure.message_id,
                    event_id = %failure.event_id,
                    dispatch = %failure.dispatch,
                    cause = %failure.cause,
                    "Unapplied event"
                );
            }
            info!(
                committed = report.health.committed,
                dropped = report.health.dropped,
                fatal = report.health.fatal,
                "Shutdown complete"
            );
        }
        Err(e) => {
            error!(error = %e, "Event bridge failed");
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
