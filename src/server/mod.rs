//! HTTP Surface
//!
//! hyper HTTP/1 server exposing the leaderboard operations plus health and
//! metrics endpoints.
//!
//! | Route | Operation |
//! |---|---|
//! | `GET /leaderboard?page&limit` | Get Page |
//! | `POST /leaderboard/update/{entityId}` | Update |
//! | `POST /leaderboard/rebuild` | Rebuild |
//! | `GET /leaderboard/stats` | tier statistics |
//! | `GET /healthz`, `GET /livez` | liveness |
//! | `GET /readyz` | tier open and Score Store reachable |
//! | `GET /metrics` | Prometheus exposition |

pub mod routes;

pub use routes::{handle, status_for, ApiResponse};

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::engine::LeaderboardEngine;
use crate::error::{Error, Result};

/// Bind the listening socket.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address '{}': {}", addr, e)))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind server: {}", e)))
}

/// Accept connections until `shutdown` is cancelled.
///
/// On shutdown, open connections finish their in-flight request and close;
/// `serve` returns once every connection task has ended.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<LeaderboardEngine>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Leaderboard server listening on {}", addr);
    }

    let connections = TaskTracker::new();
    let result = accept_loop(&listener, &engine, &shutdown, &connections).await;

    connections.close();
    if !connections.is_empty() {
        info!(open = connections.len(), "Draining open connections");
    }
    connections.wait().await;
    info!("Leaderboard server stopped");

    result
}

async fn accept_loop(
    listener: &TcpListener,
    engine: &Arc<LeaderboardEngine>,
    shutdown: &CancellationToken,
    connections: &TaskTracker,
) -> Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Leaderboard server stopped accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("Server accept error: {}", e)))?,
        };

        let io = TokioIo::new(stream);
        let engine = Arc::clone(engine);
        let shutdown = shutdown.clone();

        connections.spawn(async move {
            let service = service_fn(move |req| {
                let engine = Arc::clone(&engine);
                async move { Ok::<_, Infallible>(dispatch(&engine, req).await) }
            });

            let conn = http1::Builder::new().serve_connection(io, service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };

            if let Err(e) = result {
                error!(%peer, "Server connection error: {}", e);
            }
        });
    }
}

async fn dispatch(engine: &LeaderboardEngine, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let api = handle(engine, &method, &path, req.uri().query()).await;
    debug!(%method, path = %path, status = api.status.as_u16(), "Handled request");

    let content_type = HeaderValue::from_str(&api.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let mut response = Response::new(Full::new(api.body));
    *response.status_mut() = api.status;
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    response
}
