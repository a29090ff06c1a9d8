//! The capabilities the sidecar engine needs from the Kubernetes API.
//!
//! The engine only ever reads a Deployment, lists Deployments and replaces a
//! Deployment as a whole. [`KubeGateway`] talks to a real cluster, tests use an
//! in-memory implementation.
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use snafu::Snafu;
use tokio::time::Instant;

use crate::{
    engine::ErrorKind,
    workload::{NamespaceScope, WorkloadRef},
};

mod kubernetes;
#[cfg(test)]
pub(crate) mod memory;

pub use self::kubernetes::{KubeGateway, KubeGatewayError};

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GatewayError {
    // The engine context names the workload already
    #[snafu(display("deployment does not exist"))]
    NotFound { workload: WorkloadRef },

    #[snafu(display("deployment was modified concurrently: {message}"))]
    Conflict {
        workload: WorkloadRef,
        message: String,
    },

    #[snafu(display("request to the Kubernetes API failed"))]
    Api { source: kube::Error },

    #[snafu(display("request to the Kubernetes API did not complete before the request deadline"))]
    DeadlineExceeded,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Api { .. } | Self::DeadlineExceeded => ErrorKind::Transport,
        }
    }
}

/// Access to the Deployments of a cluster.
///
/// Every call receives the deadline of the request it belongs to and fails
/// with [`GatewayError::DeadlineExceeded`] once it has passed. Implementations
/// neither cache nor retry.
//
// We still need to use the async-trait crate, as the engine holds the gateway
// as a trait object and async functions in traits are not dyn compatible.
#[async_trait]
pub trait WorkloadGateway: Send + Sync {
    /// Fetches a single Deployment.
    async fn get(&self, workload: &WorkloadRef, deadline: Instant) -> Result<Deployment>;

    /// Lists the Deployments of one or all namespaces.
    async fn list(&self, scope: &NamespaceScope, deadline: Instant) -> Result<Vec<Deployment>>;

    /// Replaces the stored Deployment with `deployment`.
    ///
    /// The `resourceVersion` of `deployment` must match the stored one,
    /// otherwise [`GatewayError::Conflict`] is returned.
    async fn replace(
        &self,
        workload: &WorkloadRef,
        deployment: &Deployment,
        deadline: Instant,
    ) -> Result<Deployment>;
}
