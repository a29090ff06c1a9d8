//! A [`tower`] layer for [`axum`] routers which produces one span and one
//! access log event per HTTP request.
//!
//! Span fields are named after the OpenTelemetry HTTP semantic conventions,
//! such as `http.request.method` or `http.response.status_code`, so that log
//! collectors can index them without extra mapping.
use std::{
    future::Future,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, MatchedPath, Request},
    http::header::USER_AGENT,
    response::Response,
};
use futures_util::ready;
use pin_project::pin_project;
use tower::{Layer, Service};
use tracing::{Span, field::Empty, info_span};

/// Wraps every request of a router in a [`TraceService`].
///
/// ```
/// use axum::{Router, routing::get};
/// use sidecar_telemetry::AxumTraceLayer;
///
/// let router: Router = Router::new()
///     .route("/", get(|| async { "up" }))
///     .layer(AxumTraceLayer::new());
/// ```
///
/// The client address is only recorded when the router is served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceLayer;

impl TraceLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService { inner }
    }
}

#[derive(Clone, Debug)]
pub struct TraceService<S> {
    inner: S,
}

impl<S> Service<Request> for TraceService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Error: std::error::Error + 'static,
    S::Future: Send + 'static,
{
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let span = request_span(&request);
        let future = span.in_scope(|| self.inner.call(request));

        ResponseFuture {
            future,
            span,
            started_at: Instant::now(),
        }
    }
}

/// Polls the inner future inside the request span and logs the outcome once
/// it completes.
#[pin_project]
pub struct ResponseFuture<F> {
    #[pin]
    future: F,
    span: Span,
    started_at: Instant,
}

impl<F, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response, E>>,
    E: std::error::Error + 'static,
{
    type Output = Result<Response, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.span.enter();

        let result = ready!(this.future.poll(cx));
        record_outcome(this.span, &result, this.started_at.elapsed());

        Poll::Ready(result)
    }
}

fn request_span(request: &Request) -> Span {
    let uri = request.uri();

    let span = info_span!(
        "HTTP request",
        http.request.method = request.method().as_str(),
        http.route = Empty,
        http.response.status_code = Empty,
        url.path = uri.path(),
        url.query = uri.query(),
        user_agent.original = Empty,
        client.address = Empty,
    );

    if let Some(route) = request.extensions().get::<MatchedPath>() {
        span.record("http.route", route.as_str());
    }

    if let Some(user_agent) = user_agent(request) {
        span.record("user_agent.original", user_agent);
    }

    if let Some(address) = client_address(request) {
        span.record("client.address", address.ip().to_string());
    }

    span
}

fn client_address(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| *address)
}

fn user_agent(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
}

fn record_outcome<E>(span: &Span, result: &Result<Response, E>, latency: Duration)
where
    E: std::error::Error + 'static,
{
    let latency_ms = latency.as_millis() as u64;

    match result {
        Ok(response) => {
            let status = response.status().as_u16();
            span.record("http.response.status_code", status);

            if response.status().is_server_error() {
                tracing::error!(status, latency_ms, "request failed");
            } else {
                tracing::info!(status, latency_ms, "request finished");
            }
        }
        Err(error) => tracing::error!(
            error = error as &dyn std::error::Error,
            latency_ms,
            "request could not be served"
        ),
    }
}
