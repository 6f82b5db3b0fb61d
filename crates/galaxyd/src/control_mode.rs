//! Control mode — owns the node registry and serves the control service.
//!
//! In this mode, the daemon:
//! 1. Creates an empty registry
//! 2. Serves the `ControlService` gRPC interface on the given port
//! 3. Stops on Ctrl-C; registrations are not kept across restarts

use std::net::SocketAddr;

use galaxy_cluster::{ControlServer, Registry};
use tracing::info;

/// Run the control service until Ctrl-C.
pub async fn run_control(port: u16, max_concurrent_streams: u32) -> anyhow::Result<()> {
    info!("Galaxy daemon starting in control mode");

    let control = ControlServer::new(Registry::new());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "gRPC server starting (control)");

    tonic::transport::Server::builder()
        .max_concurrent_streams(max_concurrent_streams)
        .add_service(control.into_service())
        .serve_with_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for CTRL+C");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("control service stopped");
    Ok(())
}
