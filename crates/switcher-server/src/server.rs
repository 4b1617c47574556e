//! HTTP server.
//!
//! One tokio task per accepted connection, each served by hyper's HTTP/1.1
//! implementation. Requests are matched against the [`Router`](crate::Router)
//! and run through the route's pipeline; `/health` and `/metrics` are
//! answered directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use switcher_server::{App, Server, SwitcherConfig};
//!
//! let config = SwitcherConfig::default();
//! let server = Server::bind(App::from_config(&config)?, &config).await?;
//! server.run().await?;
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use switcher_middleware::{
    json_response, text_response, MiddlewareContext, Request, Response, NOT_FOUND_MESSAGE,
};
use switcher_telemetry::metrics::record_request;
use switcher_telemetry::render_metrics;
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

use crate::app::App;
use crate::config::{SwitcherConfig, HEALTH_PATH, METRICS_PATH};
use crate::error::{ServerError, ServerResult};
use crate::health::HealthCheck;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Metrics label for requests that matched no route.
const UNMATCHED_ROUTE: &str = "unmatched";

/// Body sent when body collection or the pipeline exceeds the request timeout.
const TIMEOUT_MESSAGE: &str = "request timed out";

/// A bound, not yet running server.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown_timeout: Duration,
    state: Arc<ServerState>,
}

#[derive(Debug)]
struct ServerState {
    app: App,
    health: HealthCheck,
    request_timeout: Duration,
    metrics_enabled: bool,
}

impl Server {
    /// Binds the configured address. Port 0 picks a free port; see
    /// [`Server::local_addr`].
    ///
    /// # Errors
    ///
    /// [`ServerError::Config`] for an unparseable address and
    /// [`ServerError::Bind`] if the socket cannot be bound.
    pub async fn bind(app: App, config: &SwitcherConfig) -> ServerResult<Self> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        Ok(Self {
            listener,
            local_addr,
            shutdown_timeout: config.server.shutdown_timeout,
            state: Arc::new(ServerState {
                app,
                health: HealthCheck::new(crate::VERSION),
                request_timeout: config.server.request_timeout,
                metrics_enabled: config.telemetry.metrics_enabled,
            }),
        })
    }

    /// Returns the bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Serves until `shutdown` is triggered, then waits up to the shutdown
    /// timeout for open connections to finish.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let Self {
            listener,
            local_addr,
            shutdown_timeout,
            state,
        } = self;

        tracing::info!(addr = %local_addr, routes = state.app.router().len(), "server listening");
        for (method, path) in state.app.router().routes() {
            tracing::debug!(%method, path, "route registered");
        }

        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&state);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(state, stream, shutdown).await {
                                tracing::debug!(peer = %peer, error = %e, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        tracing::info!(
            active = tracker.active_connections(),
            timeout_secs = shutdown_timeout.as_secs(),
            "waiting for open connections"
        );
        tokio::select! {
            () = tracker.wait_for_idle() => tracing::info!("all connections closed"),
            () = tokio::time::sleep(shutdown_timeout) => tracing::warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            ),
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

async fn serve_connection(
    state: Arc<ServerState>,
    stream: TcpStream,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let service = service_fn(move |req: http::Request<Incoming>| {
        let state = Arc::clone(&state);
        async move { Ok::<_, Infallible>(state.handle(req).await) }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

impl ServerState {
    async fn handle(&self, req: http::Request<Incoming>) -> Response {
        let ctx = MiddlewareContext::new();
        let started = ctx.started_at();
        let span = tracing::info_span!(
            "request",
            request_id = %ctx.request_id(),
            method = %req.method(),
            path = %req.uri().path(),
        );

        async move {
            let (route, response) = self.dispatch(req, ctx).await;
            let elapsed = started.elapsed();
            let status = response.status().as_u16();

            record_request(route, status, elapsed);
            tracing::info!(
                route,
                status,
                duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    /// Returns the metrics label alongside the response.
    async fn dispatch(
        &self,
        req: http::Request<Incoming>,
        ctx: MiddlewareContext,
    ) -> (&str, Response) {
        if req.method() == Method::GET {
            match req.uri().path() {
                HEALTH_PATH => {
                    return ("health", json_response(StatusCode::OK, self.health.to_json()));
                }
                METRICS_PATH => return ("metrics", self.metrics()),
                _ => {}
            }
        }

        let Some(route) = self.app.router().match_route(req.method(), req.uri().path()) else {
            tracing::debug!("no route matched");
            return (
                UNMATCHED_ROUTE,
                text_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE),
            );
        };

        let (parts, body) = req.into_parts();
        let body = match tokio::time::timeout(self.request_timeout, body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to read request body");
                return (
                    route.path(),
                    text_response(StatusCode::BAD_REQUEST, "failed to read request body"),
                );
            }
            Err(_) => {
                tracing::warn!("request body collection timed out");
                return (
                    route.path(),
                    text_response(StatusCode::REQUEST_TIMEOUT, TIMEOUT_MESSAGE),
                );
            }
        };

        let request: Request = http::Request::from_parts(parts, body);
        match tokio::time::timeout(
            self.request_timeout,
            route.pipeline().process(ctx, &request),
        )
        .await
        {
            Ok(response) => (route.path(), response),
            Err(_) => {
                tracing::warn!("pipeline timed out");
                (
                    route.path(),
                    text_response(StatusCode::GATEWAY_TIMEOUT, TIMEOUT_MESSAGE),
                )
            }
        }
    }

    fn metrics(&self) -> Response {
        match render_metrics().filter(|_| self.metrics_enabled) {
            Some(text) => text_response(StatusCode::OK, text),
            None => text_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE),
        }
    }
}
