//! Node mode — runs on worker processes, registers with the control service.
//!
//! In this mode, the daemon:
//! 1. Serves the node's own heartbeat endpoint on its port
//! 2. Connects to the control service and checks its heartbeat
//! 3. Registers this node
//! 4. Prints the peer list every poll interval
//! 5. On Ctrl-C or any fatal error, deregisters once and stops

use std::fmt::Write as _;
use std::net::SocketAddr;

use anyhow::anyhow;
use galaxy_cluster::{AgentConfig, ClusterResult, NodeAgent, NodeDescriptor, NodeServer};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Run a node until Ctrl-C or a fatal error.
pub async fn run_node(config: AgentConfig, json: bool) -> anyhow::Result<()> {
    info!("Galaxy daemon starting in node mode");

    // ── Node endpoint ────────────────────────────────────────────
    let port = u16::try_from(config.service_port)?;
    let endpoint_addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%endpoint_addr, "gRPC server starting (node)");

    let mut endpoint = tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(NodeServer::new().into_service())
            .serve(endpoint_addr)
            .await
    });

    // ── Shutdown signal ──────────────────────────────────────────
    // Installed before dialing so a Ctrl-C at any point after this is
    // routed through the teardown below.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    install_ctrl_c(shutdown_tx).await;

    // ── Register with the control service ────────────────────────
    let mut agent = NodeAgent::new(config);

    // ── Poll until shutdown or failure ───────────────────────────
    let started = start(&mut agent, &shutdown_rx).await;
    let polled = match started {
        Ok(true) => tokio::select! {
            result = agent.run(shutdown_rx, |peers| print!("{}", render_peers(peers, json))) => {
                result.map_err(anyhow::Error::from)
            }
            served = &mut endpoint => match served {
                Ok(Ok(())) => Err(anyhow!("node endpoint stopped unexpectedly")),
                Ok(Err(e)) => Err(anyhow!("node endpoint failed: {e}")),
                Err(e) => Err(anyhow!("node endpoint task failed: {e}")),
            },
        },
        Ok(false) => {
            info!("shutdown requested during startup");
            Ok(())
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = &polled {
        error!(error = %e, "node lifecycle failed");
    }

    // ── Teardown ─────────────────────────────────────────────────
    let teardown = agent.shutdown().await;
    endpoint.abort();

    if let Err(e) = &teardown {
        error!(error = %e, "could not deregister");
    }

    polled?;
    teardown?;

    info!("node stopped");
    Ok(())
}

/// Connect, verify and register, stopping early if shutdown was requested.
///
/// Returns `Ok(false)` when a shutdown request cut startup short. An
/// in-flight call is never abandoned, so a registration that reached the
/// control service is always visible to the teardown.
async fn start(agent: &mut NodeAgent, shutdown: &watch::Receiver<bool>) -> ClusterResult<bool> {
    if *shutdown.borrow() {
        return Ok(false);
    }
    agent.connect().await?;

    if *shutdown.borrow() {
        return Ok(false);
    }
    agent.verify().await?;

    if *shutdown.borrow() {
        return Ok(false);
    }
    agent.register().await?;
    Ok(true)
}

/// Route Ctrl-C into `shutdown_tx`.
///
/// The handler is registered before this returns.
async fn install_ctrl_c(shutdown_tx: watch::Sender<bool>) {
    let mut ctrl_c = Box::pin(tokio::signal::ctrl_c());

    // First poll registers the handler.
    let early = tokio::select! {
        biased;
        result = &mut ctrl_c => Some(result),
        _ = std::future::ready(()) => None,
    };

    tokio::spawn(async move {
        let result = match early {
            Some(result) => result,
            None => ctrl_c.await,
        };
        if let Err(e) = result {
            error!(error = %e, "failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });
}

/// Format one poll's worth of peers for stdout.
fn render_peers(peers: &[NodeDescriptor], json: bool) -> String {
    let mut out = String::new();

    if json {
        for peer in peers {
            match serde_json::to_string(peer) {
                Ok(line) => {
                    let _ = writeln!(out, "{line}");
                }
                Err(e) => warn!(error = %e, "could not encode peer"),
            }
        }
        return out;
    }

    let _ = writeln!(out, "Nodes:");
    for peer in peers {
        let _ = writeln!(out, "  {peer}");
    }
    out
}
