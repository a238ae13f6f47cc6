//! Paramita Gateway - API gateway for the Six Perfections assessment platform

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use paramita_gateway::{config::Args, logging, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init_tracing(&args.log_level, args.log_format)?;

    std::panic::set_hook(Box::new(|panic| {
        error!(panic = %panic, "Unrecoverable panic");
    }));

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Paramita Gateway");
    info!("  Six Perfections assessment platform");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("User data: {}", args.user_data_dir().display());
    for target in args.services.targets() {
        info!(
            "  {}: {} (timeout {}ms)",
            target.name,
            target.base_url,
            target.timeout.as_millis()
        );
    }
    info!("======================================");

    if args.dev_mode && args.jwt_secret.is_none() {
        warn!("JWT_SECRET not set - signing with the built-in development secret");
    }

    let state = match AppState::new(args) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = server::run(state) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        signal = shutdown_signal() => {
            info!("Received {}, shutting down", signal);
        }
    }

    Ok(())
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
