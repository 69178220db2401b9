use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use arn_protocol::config::NetworkConfig;
use arn_protocol::error::Result;
use arn_protocol::protocol::Handler;
use arn_protocol::transport::Server;
use arn_protocol::utils::logging::setup_logging;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

fn load_config() -> Result<NetworkConfig> {
    let config = match std::env::var("ARN_CONFIG") {
        Ok(path) => NetworkConfig::from_file(path)?,
        Err(_) => NetworkConfig::from_env()?,
    };
    config.validate_strict()?;
    Ok(config)
}

/// Resolves on CTRL+C or, on unix, SIGTERM.
///
/// Signal handlers are installed before this returns, so a signal delivered
/// before the future is polled is not lost.
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received CTRL+C signal, shutting down"),
                _ = terminate.recv() => info!("Received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for CTRL+C, shutting down");
            } else {
                info!("Received CTRL+C signal, shutting down");
            }
        }
    })
}

async fn run(config: NetworkConfig) -> Result<()> {
    let handler = Handler::new()
        .with_message_callback(|msg| {
            info!(kind = ?msg.message_type, bytes = msg.payload.len(), "Received message");
            Ok(())
        })
        .with_bridge_callback(|bridge| {
            info!(id = %bridge.id, endpoint = %bridge.endpoint, "Registering MCP bridge");
            Ok(())
        });

    let mut server = Server::with_config(config, Arc::new(handler));
    server.start().await?;

    let shutdown = shutdown_signal()?;
    shutdown.await;

    server.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_logging(&config.logging) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let shutdown = shutdown_signal().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .expect("kill runs");
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .expect("SIGTERM resolves the shutdown future");
    }
}
