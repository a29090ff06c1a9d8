use std::future::Future;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    Api, Client, Config,
    api::{ListParams, PostParams},
};
use snafu::{IntoError, ResultExt, Snafu};
use tokio::time::{Instant, timeout_at};
use tracing::instrument;

use super::{
    ApiSnafu, ConflictSnafu, DeadlineExceededSnafu, GatewayError, NotFoundSnafu, Result,
    WorkloadGateway,
};
use crate::workload::{NamespaceScope, WorkloadRef};

#[derive(Debug, Snafu)]
pub enum KubeGatewayError {
    #[snafu(display("failed to create Kubernetes client"))]
    CreateClient { source: kube::Error },
}

/// A [`WorkloadGateway`] backed by the `apps/v1` Deployment API of a cluster.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    post_params: PostParams,
}

impl KubeGateway {
    /// Creates the gateway from an already resolved client configuration.
    ///
    /// `field_manager` is recorded by the API server as the owner of the
    /// fields changed by a replace.
    pub fn new(config: Config, field_manager: impl Into<String>) -> Result<Self, KubeGatewayError> {
        let client = Client::try_from(config).context(CreateClientSnafu)?;

        Ok(Self::from_client(client, field_manager))
    }

    pub fn from_client(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            post_params: PostParams {
                field_manager: Some(field_manager.into()),
                ..PostParams::default()
            },
        }
    }

    fn namespaced_api(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn scoped_api(&self, scope: &NamespaceScope) -> Api<Deployment> {
        match scope {
            NamespaceScope::All => Api::all(self.client.clone()),
            NamespaceScope::One(namespace) => self.namespaced_api(namespace),
        }
    }
}

#[async_trait]
impl WorkloadGateway for KubeGateway {
    #[instrument(skip_all, fields(%workload))]
    async fn get(&self, workload: &WorkloadRef, deadline: Instant) -> Result<Deployment> {
        let api = self.namespaced_api(&workload.namespace);
        let deployment = within_deadline(deadline, api.get(&workload.name))
            .await?
            .map_err(|error| classify(error, workload))?;

        tracing::debug!(
            resource_version = deployment.metadata.resource_version.as_deref(),
            "fetched deployment"
        );
        Ok(deployment)
    }

    #[instrument(skip_all, fields(%scope))]
    async fn list(&self, scope: &NamespaceScope, deadline: Instant) -> Result<Vec<Deployment>> {
        let api = self.scoped_api(scope);
        let deployments = within_deadline(deadline, api.list(&ListParams::default()))
            .await?
            .context(ApiSnafu)?;

        tracing::debug!(count = deployments.items.len(), "listed deployments");
        Ok(deployments.items)
    }

    #[instrument(skip_all, fields(%workload))]
    async fn replace(
        &self,
        workload: &WorkloadRef,
        deployment: &Deployment,
        deadline: Instant,
    ) -> Result<Deployment> {
        let api = self.namespaced_api(&workload.namespace);
        let replaced = within_deadline(
            deadline,
            api.replace(&workload.name, &self.post_params, deployment),
        )
        .await?
        .map_err(|error| classify(error, workload))?;

        tracing::debug!(
            resource_version = replaced.metadata.resource_version.as_deref(),
            "replaced deployment"
        );
        Ok(replaced)
    }
}

async fn within_deadline<T>(deadline: Instant, future: impl Future<Output = T>) -> Result<T> {
    timeout_at(deadline, future)
        .await
        .map_err(|_| DeadlineExceededSnafu.build())
}

/// Maps the HTTP status of a failed API call onto the gateway error taxonomy.
fn classify(error: kube::Error, workload: &WorkloadRef) -> GatewayError {
    match error {
        kube::Error::Api(ref status) if status.code == 404 => NotFoundSnafu {
            workload: workload.clone(),
        }
        .build(),
        kube::Error::Api(ref status) if status.code == 409 => ConflictSnafu {
            workload: workload.clone(),
            message: &status.message,
        }
        .build(),
        source => ApiSnafu.into_error(source),
    }
}
