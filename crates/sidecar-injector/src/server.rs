//! Serves the injector API over plain HTTP until the process is asked to stop.
use std::net::SocketAddr;

use axum::{Router, routing::get};
use futures_util::{FutureExt as _, select};
use sidecar_telemetry::AxumTraceLayer;
use snafu::{ResultExt, Snafu};
use tokio::{
    net::TcpListener,
    signal::unix::{Signal, SignalKind, signal},
};
use tower::ServiceBuilder;

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum ServerError {
    #[snafu(display("failed to bind TCP listener to {socket_addr}"))]
    BindTcpListener {
        source: std::io::Error,
        socket_addr: SocketAddr,
    },

    #[snafu(display("failed to register {signal} handler"))]
    RegisterSignalHandler {
        source: std::io::Error,
        signal: &'static str,
    },

    #[snafu(display("failed to serve HTTP requests"))]
    Serve { source: std::io::Error },
}

pub struct ApiServer {
    listener: TcpListener,
    router: Router,
}

impl ApiServer {
    /// Binds to `socket_addr` and wraps `router` in the request tracing layer.
    ///
    /// The `/health` route is added after the layer, so probes do not show up
    /// in the access log.
    pub async fn new(router: Router, socket_addr: SocketAddr) -> Result<Self> {
        tracing::debug!("create tracing service (layer)");
        let trace_layer = AxumTraceLayer::new();
        let service_builder = ServiceBuilder::new().layer(trace_layer);

        let router = router
            .layer(service_builder)
            .route("/health", get(|| async { "ok" }));

        let listener = TcpListener::bind(socket_addr)
            .await
            .context(BindTcpListenerSnafu { socket_addr })?;

        Ok(Self { listener, router })
    }

    /// The address the server is actually listening on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Serves requests until SIGINT or SIGTERM is received, then waits for
    /// in-flight requests to complete.
    pub async fn run(self) -> Result<()> {
        let sigint = register(SignalKind::interrupt(), "SIGINT")?;
        let sigterm = register(SignalKind::terminate(), "SIGTERM")?;
        tracing::debug!("created unix signal handlers");

        tracing::info!(address = ?self.local_addr(), "starting HTTP server");
        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(sigint, sigterm))
        .await
        .context(ServeSnafu)?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn register(kind: SignalKind, name: &'static str) -> Result<Signal> {
    signal(kind).context(RegisterSignalHandlerSnafu { signal: name })
}

async fn shutdown_signal(mut sigint: Signal, mut sigterm: Signal) {
    select! {
        signal = sigint.recv().fuse() => {
            if signal.is_some() {
                tracing::info!("received SIGINT, shutting down");
            }
        },
        signal = sigterm.recv().fuse() => {
            if signal.is_some() {
                tracing::info!("received SIGTERM, shutting down");
            }
        },
    };
}
