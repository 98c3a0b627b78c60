use clap::Parser;
use keelson::config::{self, AppConfig, ConfigBuilder};
use keelson::lifecycle::{Application, shutdown_signal};
use keelson::logging::init_logging;
use keelson::messaging::{BrokerConnector, MessagingSubsystem};
use keelson::{KeelsonError, Result};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "keelson")]
#[command(about = "Service scaffold with ordered subsystem lifecycle", long_about = None)]
struct Cli {
    /// Config file path; built-in defaults are used when it does not exist
    #[arg(short, long, env = "KEELSON_CONFIG", default_value = "config/keelson.toml")]
    config: PathBuf,

    /// Override `logging.level` (RUST_LOG still wins)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration from {}: {e}", cli.config.display());
            process::exit(e.exit_code());
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("failed to initialize logging: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Exiting with failure");
        process::exit(e.exit_code());
    }
}

fn load(cli: &Cli) -> Result<Arc<AppConfig>> {
    let config = config::load_or_default(&cli.config)?;
    let config = match &cli.log_level {
        Some(level) => ConfigBuilder::from_config((*config).clone())
            .logging(|logging| logging.level = level.clone())
            .build()?,
        None => config,
    };
    Ok(config)
}

#[cfg(feature = "kafka")]
fn broker_connector() -> Option<Arc<dyn BrokerConnector>> {
    Some(Arc::new(keelson::messaging::KafkaConnector::new()))
}

#[cfg(not(feature = "kafka"))]
fn broker_connector() -> Option<Arc<dyn BrokerConnector>> {
    None
}

async fn run(config: Arc<AppConfig>) -> Result<()> {
    let mut builder = Application::builder(Arc::clone(&config));
    if config.messaging.enabled {
        let connector = broker_connector().ok_or(KeelsonError::Unsupported {
            section: "messaging",
            reason: "this build has no broker binding (enable the `kafka` feature)",
        })?;
        builder = builder.register(MessagingSubsystem::with_connector(connector));
    }

    let app = builder.start().await.inspect_err(|e| {
        error!(error = %e, "Startup failed");
    })?;

    let listener = match TcpListener::bind(config.server.bind_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %config.server.bind_address(), error = %e, "Failed to bind HTTP listener");
            if let Err(e) = app.shutdown().await {
                error!(error = %e, "Shutdown reported failures");
            }
            return Err(e.into());
        }
    };

    if let Err(e) = keelson::http::serve(app.clone(), listener, shutdown_signal()).await {
        error!(error = %e, "HTTP server failed");
    }

    app.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}
