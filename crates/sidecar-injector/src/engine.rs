//! Attaching and detaching sidecar containers.
//!
//! Both mutations follow the same protocol: fetch the Deployment, compute the
//! new container list, replace the Deployment as a whole and re-fetch it, so
//! the caller always sees the state the API server persisted.
use std::{sync::Arc, time::Duration};

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Container, PodSpec, VolumeMount},
};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use strum::Display;
use tokio::time::Instant;
use tracing::instrument;

use crate::{
    gateway::{GatewayError, WorkloadGateway},
    naming::SidecarNamePrefix,
    workload::{
        NamespaceScope, SidecarRemovalSpec, SidecarSpec, ValidationError, WorkloadQuery,
        WorkloadRef, WorkloadSummary,
    },
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The coarse category of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ErrorKind {
    /// A required value was empty. Nothing was sent to the API server.
    Validation,

    /// A requested mount names a volume the pod template does not declare.
    Referential,
    NotFound,
    Conflict,
    Transport,
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(transparent)]
    InvalidRequest { source: ValidationError },

    #[snafu(display("failed to get deployment {workload}"))]
    FetchWorkload {
        source: GatewayError,
        workload: WorkloadRef,
    },

    #[snafu(display("failed to list deployments in {scope}"))]
    ListWorkloads {
        source: GatewayError,
        scope: NamespaceScope,
    },

    #[snafu(display("deployment {workload} has no pod template"))]
    MissingPodTemplate { workload: WorkloadRef },

    #[snafu(display(
        "volume {volume:?} is not declared on deployment {workload}, cannot continue"
    ))]
    VolumeNotFound {
        volume: String,
        workload: WorkloadRef,
    },

    #[snafu(display("container {container:?} not found in deployment {workload}"))]
    ContainerNotFound {
        container: String,
        workload: WorkloadRef,
    },

    #[snafu(display("failed to update deployment {workload}"))]
    ReplaceWorkload {
        source: GatewayError,
        workload: WorkloadRef,
    },

    #[snafu(display("failed to get deployment {workload} after updating it"))]
    RefetchWorkload {
        source: GatewayError,
        workload: WorkloadRef,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. } => ErrorKind::Validation,
            Self::VolumeNotFound { .. } => ErrorKind::Referential,
            Self::MissingPodTemplate { .. } | Self::ContainerNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::FetchWorkload { source, .. }
            | Self::ListWorkloads { source, .. }
            | Self::ReplaceWorkload { source, .. }
            | Self::RefetchWorkload { source, .. } => source.kind(),
        }
    }
}

/// Applies sidecar mutations to Deployments through a [`WorkloadGateway`].
///
/// The engine is stateless apart from its configuration, so one instance is
/// shared by all requests.
pub struct SidecarEngine {
    gateway: Arc<dyn WorkloadGateway>,
    prefix: SidecarNamePrefix,
    request_timeout: Duration,
}

impl SidecarEngine {
    pub fn new(
        gateway: Arc<dyn WorkloadGateway>,
        prefix: SidecarNamePrefix,
        request_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            prefix,
            request_timeout,
        }
    }

    /// Appends a sidecar container to the pod template of a Deployment.
    ///
    /// Every requested mount must reference a volume declared on the pod
    /// template, otherwise nothing is written. Attaching the same sidecar
    /// twice adds a second container with the same name, which the API server
    /// rejects on replace.
    #[instrument(skip_all, fields(workload = %spec.workload, container = %spec.container_base_name))]
    pub async fn attach(&self, spec: &SidecarSpec) -> Result<WorkloadSummary> {
        spec.validate()?;
        let deadline = self.deadline();
        let workload = &spec.workload;

        let mut deployment = self.fetch(workload, deadline).await?;
        let container = self.sidecar_container(spec);
        let pod_spec = pod_spec_mut(&mut deployment, workload)?;

        let declared_volumes = pod_spec.volumes.as_deref().unwrap_or_default();
        for mount in &spec.mounts {
            ensure!(
                declared_volumes
                    .iter()
                    .any(|volume| volume.name == mount.volume_name),
                VolumeNotFoundSnafu {
                    volume: &mount.volume_name,
                    workload: workload.clone(),
                }
            );
        }

        tracing::info!(container.name = %container.name, "appending sidecar container");
        pod_spec.containers.push(container);

        self.write_back(workload, &deployment, deadline).await
    }

    /// Removes the first container named after the sidecar from the pod
    /// template of a Deployment.
    #[instrument(skip_all, fields(workload = %spec.workload, container = %spec.container_base_name))]
    pub async fn detach(&self, spec: &SidecarRemovalSpec) -> Result<WorkloadSummary> {
        spec.validate()?;
        let deadline = self.deadline();
        let workload = &spec.workload;

        let mut deployment = self.fetch(workload, deadline).await?;
        let container_name = self.prefix.container_name(&spec.container_base_name);
        let pod_spec = pod_spec_mut(&mut deployment, workload)?;

        let index = pod_spec
            .containers
            .iter()
            .position(|container| container.name == container_name)
            .context(ContainerNotFoundSnafu {
                container: &container_name,
                workload: workload.clone(),
            })?;

        tracing::info!(container.name = %container_name, index, "removing sidecar container");
        pod_spec.containers.remove(index);

        self.write_back(workload, &deployment, deadline).await
    }

    #[instrument(skip_all, fields(%workload))]
    pub async fn get(&self, workload: &WorkloadRef) -> Result<WorkloadSummary> {
        workload.validate()?;

        let deployment = self.fetch(workload, self.deadline()).await?;
        Ok(WorkloadSummary::from(&deployment))
    }

    /// Lists the Deployments selected by `query` in the order the API server
    /// returned them.
    #[instrument(skip_all, fields(scope = %query.scope, name_pattern = query.name_pattern.as_deref()))]
    pub async fn list(&self, query: &WorkloadQuery) -> Result<Vec<WorkloadSummary>> {
        let deployments = self
            .gateway
            .list(&query.scope, self.deadline())
            .await
            .context(ListWorkloadsSnafu {
                scope: query.scope.clone(),
            })?;

        let summaries: Vec<_> = deployments
            .iter()
            .map(WorkloadSummary::from)
            .filter(|summary| query.matches(summary))
            .collect();

        tracing::debug!(
            listed = deployments.len(),
            matched = summaries.len(),
            "listed deployments"
        );
        Ok(summaries)
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.request_timeout
    }

    fn sidecar_container(&self, spec: &SidecarSpec) -> Container {
        let volume_mounts = spec
            .mounts
            .iter()
            .map(|mount| VolumeMount {
                name: mount.volume_name.clone(),
                mount_path: mount.mount_path.clone(),
                ..VolumeMount::default()
            })
            .collect();

        Container {
            name: self.prefix.container_name(&spec.container_base_name),
            image: Some(spec.image.clone()),
            // Leaving the command unset keeps the entrypoint of the image
            command: (!spec.command.is_empty()).then(|| spec.command.clone()),
            volume_mounts: Some(volume_mounts),
            ..Container::default()
        }
    }

    async fn fetch(&self, workload: &WorkloadRef, deadline: Instant) -> Result<Deployment> {
        self.gateway
            .get(workload, deadline)
            .await
            .context(FetchWorkloadSnafu {
                workload: workload.clone(),
            })
    }

    /// Replaces the Deployment and projects the state read back afterwards.
    async fn write_back(
        &self,
        workload: &WorkloadRef,
        deployment: &Deployment,
        deadline: Instant,
    ) -> Result<WorkloadSummary> {
        self.gateway
            .replace(workload, deployment, deadline)
            .await
            .context(ReplaceWorkloadSnafu {
                workload: workload.clone(),
            })?;

        let persisted = self
            .gateway
            .get(workload, deadline)
            .await
            .context(RefetchWorkloadSnafu {
                workload: workload.clone(),
            })?;

        Ok(WorkloadSummary::from(&persisted))
    }
}

fn pod_spec_mut<'a>(
    deployment: &'a mut Deployment,
    workload: &WorkloadRef,
) -> Result<&'a mut PodSpec> {
    deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .context(MissingPodTemplateSnafu {
            workload: workload.clone(),
        })
}
