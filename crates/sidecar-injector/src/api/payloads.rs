//! Request bodies of the injector API.
//!
//! Keys are PascalCase on the wire. Missing required keys are rejected while
//! deserializing, empty values are left to the validation of the domain types.
use serde::Deserialize;

use crate::workload::{
    NamespaceScope, SidecarRemovalSpec, SidecarSpec, VolumeMountRequest, WorkloadQuery,
    WorkloadRef,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetDeploymentsPayload {
    /// An empty or missing namespace selects all namespaces.
    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub filtered: bool,

    #[serde(default)]
    pub deployment_name_substring_pattern: String,
}

impl From<GetDeploymentsPayload> for WorkloadQuery {
    fn from(payload: GetDeploymentsPayload) -> Self {
        Self {
            scope: NamespaceScope::from(payload.namespace.as_str()),
            name_pattern: payload
                .filtered
                .then_some(payload.deployment_name_substring_pattern),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetSingleDeploymentPayload {
    pub namespace: String,
    pub deployment_name: String,
}

impl From<GetSingleDeploymentPayload> for WorkloadRef {
    fn from(payload: GetSingleDeploymentPayload) -> Self {
        Self::new(payload.namespace, payload.deployment_name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeMountPayload {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetSidecarPayload {
    pub namespace: String,
    pub deployment_name: String,
    pub sidecar_container_name: String,
    pub sidecar_image: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub command: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub volume_mounts: Vec<VolumeMountPayload>,
}

impl From<SetSidecarPayload> for SidecarSpec {
    fn from(payload: SetSidecarPayload) -> Self {
        Self {
            workload: WorkloadRef::new(payload.namespace, payload.deployment_name),
            container_base_name: payload.sidecar_container_name,
            image: payload.sidecar_image,
            command: payload.command,
            mounts: payload
                .volume_mounts
                .into_iter()
                .map(|mount| VolumeMountRequest {
                    volume_name: mount.name,
                    mount_path: mount.mount_path,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClearSidecarPayload {
    pub namespace: String,
    pub deployment_name: String,
    pub sidecar_container_name: String,
}

impl From<ClearSidecarPayload> for SidecarRemovalSpec {
    fn from(payload: ClearSidecarPayload) -> Self {
        Self {
            workload: WorkloadRef::new(payload.namespace, payload.deployment_name),
            container_base_name: payload.sidecar_container_name,
        }
    }
}

/// Treats an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
