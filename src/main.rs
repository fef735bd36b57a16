use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};

use crate::config::Config;
use crate::http::AppState;
use crate::publisher::ExecutableLauncher;
use crate::registration::SignallingClient;
use crate::supervisor::Supervisor;
use crate::wifi::WifiScanner;

mod config;
mod error;
mod http;
mod pipeline;
mod publisher;
mod registration;
mod session;
mod supervisor;
#[cfg(test)]
mod test_helpers;
mod wifi;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;

    let registrar = Arc::new(SignallingClient::new(config.registration_timeout)?);
    let launcher = Arc::new(ExecutableLauncher::new(config.publisher_bin.clone()));
    let supervisor = Supervisor::spawn(config.supervisor_settings(), registrar, launcher);

    let app = crate::http::create_router(AppState {
        supervisor: supervisor.clone(),
        wifi: Arc::new(WifiScanner::new(config.wifi_sudo)),
    });

    let listener = TcpListener::bind(config.bind_addr).await?;
    log::info!("Server running on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(err) => {
            log::error!("Failed to install SIGTERM handler: {err}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
    log::info!("Shutting down");
}
