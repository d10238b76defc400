use std::future::Future;

use axum::extract::ConnectInfo;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tower::Service;

/// Accepts connections until `shutdown` resolves, then drains every in-flight
/// request before returning.
pub async fn serve<F>(app: Router, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()>,
{
    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {addr}"),
        Err(error) => tracing::warn!("listening on unknown address: {error}"),
    }

    let builder = AutoBuilder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();

    // Pin the shutdown future so we can poll it in the select loop
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, remote_addr) = match result {
                    Ok(conn) => conn,
                    Err(error) => {
                        tracing::error!("failed to accept connection: {error}");
                        continue;
                    }
                };

                // Match axum default: set TCP_NODELAY for low-latency
                if let Err(error) = socket.set_nodelay(true) {
                    tracing::warn!("failed to set TCP_NODELAY: {error}");
                }

                // Create a service for this connection that injects ConnectInfo
                let app = app.clone();
                let service = hyper::service::service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                    let mut app = app.clone();
                    let mut req = req.map(axum::body::Body::new);
                    req.extensions_mut().insert(ConnectInfo(remote_addr));
                    async move { app.call(req).await }
                });

                // Serve the connection with HTTP/1 + HTTP/2 auto-detection and upgrade support
                let conn = builder.serve_connection_with_upgrades(
                    TokioIo::new(socket),
                    service,
                );

                // Register connection with graceful shutdown handler
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(error) = conn.await {
                        tracing::debug!("connection closed: {error}");
                    }
                });
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for all in-flight connections to complete
    graceful.shutdown().await;

    tracing::info!("HTTP server graceful shutdown completed");
}
