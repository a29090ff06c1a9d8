//! The domain types the injector works with and the projection of a Kubernetes
//! [`Deployment`] into the [`WorkloadSummary`] returned to API callers.
use std::fmt::Display;

use k8s_openapi::api::{apps::v1::Deployment, core::v1::PodSpec};
use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

/// Required values which were present in a request but empty.
///
/// These are detected before any call to the Kubernetes API is made.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ValidationError {
    #[snafu(display("namespace is required"))]
    MissingNamespace,

    #[snafu(display("DeploymentName is required"))]
    MissingDeploymentName,

    #[snafu(display("SidecarImage is required"))]
    MissingSidecarImage,

    #[snafu(display("SidecarContainerName is required"))]
    MissingSidecarContainerName,
}

/// Identifies a single Deployment.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Checks the namespace first and the name second.
    pub fn validate(&self) -> Result<(), ValidationError> {
        ensure!(!self.namespace.is_empty(), MissingNamespaceSnafu);
        ensure!(!self.name.is_empty(), MissingDeploymentNameSnafu);
        Ok(())
    }
}

impl Display for WorkloadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Requests that a volume, which is already declared on the pod template, is
/// mounted into the sidecar container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeMountRequest {
    pub volume_name: String,
    pub mount_path: String,
}

/// Everything needed to attach a sidecar container to a Deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidecarSpec {
    pub workload: WorkloadRef,

    /// Name of the container without the configured sidecar prefix.
    pub container_base_name: String,
    pub image: String,

    /// Overrides the image entrypoint. An empty command keeps the entrypoint.
    pub command: Vec<String>,
    pub mounts: Vec<VolumeMountRequest>,
}

impl SidecarSpec {
    /// Checks namespace, name, image and container name in this order, the
    /// first violation wins.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.workload.validate()?;
        ensure!(!self.image.is_empty(), MissingSidecarImageSnafu);
        ensure!(
            !self.container_base_name.is_empty(),
            MissingSidecarContainerNameSnafu
        );
        Ok(())
    }
}

/// Everything needed to remove a previously attached sidecar container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidecarRemovalSpec {
    pub workload: WorkloadRef,
    pub container_base_name: String,
}

impl SidecarRemovalSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.workload.validate()?;
        ensure!(
            !self.container_base_name.is_empty(),
            MissingSidecarContainerNameSnafu
        );
        Ok(())
    }
}

/// The externally visible view of a Deployment.
///
/// It is recomputed from the Kubernetes object on every request and never
/// stored by the injector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkloadSummary {
    pub namespace: String,
    pub name: String,

    /// All volumes declared on the pod template, in declaration order.
    pub volume_names: Vec<String>,
}

impl From<&Deployment> for WorkloadSummary {
    fn from(deployment: &Deployment) -> Self {
        let volume_names = pod_spec(deployment)
            .and_then(|pod_spec| pod_spec.volumes.as_ref())
            .map(|volumes| volumes.iter().map(|volume| volume.name.clone()).collect())
            .unwrap_or_default();

        Self {
            namespace: deployment.metadata.namespace.clone().unwrap_or_default(),
            name: deployment.metadata.name.clone().unwrap_or_default(),
            volume_names,
        }
    }
}

/// Returns the pod template spec of the Deployment, if it has one.
pub(crate) fn pod_spec(deployment: &Deployment) -> Option<&PodSpec> {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
}

/// The namespaces a list operation looks at.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NamespaceScope {
    All,
    One(String),
}

impl From<&str> for NamespaceScope {
    fn from(namespace: &str) -> Self {
        if namespace.is_empty() {
            Self::All
        } else {
            Self::One(namespace.to_owned())
        }
    }
}

impl Display for NamespaceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("all namespaces"),
            Self::One(namespace) => write!(f, "namespace {namespace:?}"),
        }
    }
}

/// Selects the Deployments returned by a list operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadQuery {
    pub scope: NamespaceScope,

    /// When set, only Deployments whose name contains this substring are kept.
    pub name_pattern: Option<String>,
}

impl WorkloadQuery {
    pub fn matches(&self, summary: &WorkloadSummary) -> bool {
        self.name_pattern
            .as_deref()
            .is_none_or(|pattern| summary.name.contains(pattern))
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::{
        api::{
            apps::v1::DeploymentSpec,
            core::v1::{PodTemplateSpec, Volume},
        },
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };
    use rstest::rstest;

    use super::*;

    fn workload(namespace: &str, name: &str) -> WorkloadRef {
        WorkloadRef::new(namespace, name)
    }

    #[rstest]
    #[case(workload("", ""), Err(ValidationError::MissingNamespace))]
    #[case(workload("", "web"), Err(ValidationError::MissingNamespace))]
    #[case(workload("ns", ""), Err(ValidationError::MissingDeploymentName))]
    #[case(workload("ns", "web"), Ok(()))]
    fn validates_workload_ref(
        #[case] workload: WorkloadRef,
        #[case] expected: Result<(), ValidationError>,
    ) {
        assert_eq!(workload.validate(), expected);
    }

    #[rstest]
    #[case("", "", "", Err(ValidationError::MissingNamespace))]
    #[case("ns", "", "", Err(ValidationError::MissingDeploymentName))]
    #[case("ns", "web", "", Err(ValidationError::MissingSidecarImage))]
    #[case("ns", "web", "busybox", Err(ValidationError::MissingSidecarContainerName))]
    fn sidecar_spec_reports_first_violation(
        #[case] namespace: &str,
        #[case] name: &str,
        #[case] image: &str,
        #[case] expected: Result<(), ValidationError>,
    ) {
        let spec = SidecarSpec {
            workload: workload(namespace, name),
            container_base_name: String::new(),
            image: image.to_owned(),
            command: Vec::new(),
            mounts: Vec::new(),
        };

        assert_eq!(spec.validate(), expected);
    }

    #[test]
    fn removal_spec_requires_container_name() {
        let spec = SidecarRemovalSpec {
            workload: workload("ns", "web"),
            container_base_name: String::new(),
        };

        assert_eq!(
            spec.validate(),
            Err(ValidationError::MissingSidecarContainerName)
        );
    }

    #[test]
    fn projects_volumes_in_declaration_order() {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_owned()),
                namespace: Some("ns".to_owned()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        volumes: Some(vec![
                            Volume {
                                name: "cache".to_owned(),
                                ..Default::default()
                            },
                            Volume {
                                name: "config".to_owned(),
                                ..Default::default()
                            },
                        ]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(
            WorkloadSummary::from(&deployment),
            WorkloadSummary {
                namespace: "ns".to_owned(),
                name: "web".to_owned(),
                volume_names: vec!["cache".to_owned(), "config".to_owned()],
            }
        );
    }

    #[test]
    fn projects_deployment_without_pod_template() {
        assert_eq!(
            WorkloadSummary::from(&Deployment::default()),
            WorkloadSummary::default()
        );
    }

    #[test]
    fn serializes_summary_with_pascal_case_keys() {
        let summary = WorkloadSummary {
            namespace: "ns".to_owned(),
            name: "web".to_owned(),
            volume_names: vec!["cache".to_owned()],
        };

        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            serde_json::json!({"Namespace": "ns", "Name": "web", "VolumeNames": ["cache"]})
        );
    }

    #[rstest]
    #[case("", NamespaceScope::All)]
    #[case("kube-system", NamespaceScope::One("kube-system".to_owned()))]
    fn parses_namespace_scope(#[case] input: &str, #[case] expected: NamespaceScope) {
        assert_eq!(NamespaceScope::from(input), expected);
    }

    #[rstest]
    #[case(None, "frontend", true)]
    #[case(Some(""), "frontend", true)]
    #[case(Some("front"), "frontend", true)]
    #[case(Some("back"), "frontend", false)]
    fn filters_by_name_substring(
        #[case] pattern: Option<&str>,
        #[case] name: &str,
        #[case] expected: bool,
    ) {
        let query = WorkloadQuery {
            scope: NamespaceScope::All,
            name_pattern: pattern.map(ToOwned::to_owned),
        };
        let summary = WorkloadSummary {
            name: name.to_owned(),
            ..Default::default()
        };

        assert_eq!(query.matches(&summary), expected);
    }
}
