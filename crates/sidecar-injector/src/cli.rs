//! Command line arguments of the injector.
//!
//! Every argument can also be provided through the environment variable of the
//! same name in SCREAMING_SNAKE_CASE.
use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, builder::NonEmptyStringValueParser};
use sidecar_telemetry::tracing::TelemetryOptions;

use crate::{client::KubeClientOptions, naming::SidecarNamePrefix};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(author, version, about)]
pub enum Command {
    /// Run the injector API server.
    Run(RunArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(long_about = "")]
pub struct RunArguments {
    /// Prefix of every injected container name, the container is named
    /// `<PREFIX>-<SidecarContainerName>`.
    #[arg(long, env, value_name = "PREFIX")]
    pub sidecar_name_prefix: SidecarNamePrefix,

    /// Shared secret callers have to send in the `X-API-KEY` header.
    #[arg(long, env, value_name = "KEY", hide_env_values = true, value_parser = NonEmptyStringValueParser::new())]
    pub secret_api_key: String,

    /// Address the HTTP server listens on.
    #[arg(long, env, default_value = "0.0.0.0:8080")]
    pub bind_address: SocketAddr,

    /// Maximum DURATION of all Kubernetes API calls made for a single request.
    #[arg(long, env, value_name = "DURATION", default_value = "30s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    /// Field manager recorded by the API server for updated Deployments.
    #[arg(long, env, default_value = "sidecar-injector")]
    pub field_manager: String,

    // All (flattened) sub structs are placed at the end to keep the help
    // headings correct.
    #[command(flatten)]
    pub kube_client: KubeClientOptions,

    #[command(flatten)]
    pub telemetry: TelemetryOptions,
}
