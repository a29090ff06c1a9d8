use std::sync::Arc;

use clap::Parser;
use sidecar_injector::{
    api::{self, ApiState},
    cli::{Command, RunArguments},
    client,
    engine::SidecarEngine,
    gateway::{KubeGateway, KubeGatewayError},
    server::{ApiServer, ServerError},
};
use sidecar_telemetry::Tracing;
use snafu::{ResultExt, Snafu};

const APP_NAME: &str = "kube-ondemand-sidecar-injector";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize tracing"))]
    InitTracing {
        source: sidecar_telemetry::tracing::Error,
    },

    #[snafu(display("failed to resolve Kubernetes client configuration"))]
    ResolveClientConfig { source: client::Error },

    #[snafu(display("failed to create Kubernetes gateway"))]
    CreateGateway { source: KubeGatewayError },

    #[snafu(display("failed to create API server"))]
    CreateServer { source: ServerError },

    #[snafu(display("failed to run API server"))]
    RunServer { source: ServerError },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let Command::Run(arguments) = Command::parse();
    run(arguments).await
}

async fn run(arguments: RunArguments) -> Result<(), Error> {
    let RunArguments {
        sidecar_name_prefix,
        secret_api_key,
        bind_address,
        request_timeout,
        field_manager,
        kube_client,
        telemetry,
    } = arguments;

    let _tracing_guard = Tracing::pre_configured(APP_NAME, telemetry)
        .init()
        .context(InitTracingSnafu)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        %sidecar_name_prefix,
        request_timeout = %humantime::format_duration(request_timeout),
        "starting {APP_NAME}"
    );

    let config = kube_client
        .resolve()
        .await
        .context(ResolveClientConfigSnafu)?;
    let gateway = KubeGateway::new(config, field_manager).context(CreateGatewaySnafu)?;
    let engine = SidecarEngine::new(Arc::new(gateway), sidecar_name_prefix, request_timeout);

    let router = api::router(ApiState {
        engine: Arc::new(engine),
        api_key: Arc::from(secret_api_key),
    });

    ApiServer::new(router, bind_address)
        .await
        .context(CreateServerSnafu)?
        .run()
        .await
        .context(RunServerSnafu)
}
