//! An in-memory [`WorkloadGateway`] for tests.
//!
//! It records every call and enforces `resourceVersion` based optimistic
//! concurrency on replace, like the API server does. Calls made after their
//! deadline fail with [`GatewayError::DeadlineExceeded`][super::GatewayError].
use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{Container, PodSpec, PodTemplateSpec, Volume},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use snafu::{OptionExt, ensure};
use tokio::time::{Instant, sleep_until};

use super::{ConflictSnafu, DeadlineExceededSnafu, NotFoundSnafu, Result, WorkloadGateway};
use crate::workload::{NamespaceScope, WorkloadRef, pod_spec};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    Get(WorkloadRef),
    List(NamespaceScope),
    Replace(WorkloadRef),
}

#[derive(Default)]
pub struct InMemoryGateway {
    deployments: Mutex<BTreeMap<WorkloadRef, Deployment>>,
    calls: Mutex<Vec<GatewayCall>>,
    concurrent_write_before_replace: AtomicBool,
    stall_next_replace: AtomicBool,
}

impl InMemoryGateway {
    pub fn with_deployments(deployments: impl IntoIterator<Item = Deployment>) -> Self {
        let gateway = Self::default();
        for deployment in deployments {
            gateway.insert(deployment);
        }
        gateway
    }

    pub fn insert(&self, mut deployment: Deployment) {
        let workload = workload_of(&deployment);
        deployment
            .metadata
            .resource_version
            .get_or_insert_with(|| "1".to_owned());
        self.deployments.lock().unwrap().insert(workload, deployment);
    }

    /// Simulates another client updating the Deployment right before the next
    /// replace, which makes that replace fail with a conflict.
    pub fn write_concurrently_before_next_replace(&self) {
        self.concurrent_write_before_replace
            .store(true, Ordering::SeqCst);
    }

    /// Makes the next replace hang until its deadline has passed. Nothing is
    /// stored.
    pub fn stall_next_replace(&self) {
        self.stall_next_replace.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn container_names(&self, namespace: &str, name: &str) -> Vec<String> {
        let deployments = self.deployments.lock().unwrap();
        deployments
            .get(&WorkloadRef::new(namespace, name))
            .and_then(pod_spec)
            .map(|pod_spec| {
                pod_spec
                    .containers
                    .iter()
                    .map(|container| container.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record(&self, call: GatewayCall, deadline: Instant) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        ensure!(Instant::now() < deadline, DeadlineExceededSnafu);
        Ok(())
    }
}

#[async_trait]
impl WorkloadGateway for InMemoryGateway {
    async fn get(&self, workload: &WorkloadRef, deadline: Instant) -> Result<Deployment> {
        self.record(GatewayCall::Get(workload.clone()), deadline)?;

        self.deployments
            .lock()
            .unwrap()
            .get(workload)
            .cloned()
            .context(NotFoundSnafu {
                workload: workload.clone(),
            })
    }

    async fn list(&self, scope: &NamespaceScope, deadline: Instant) -> Result<Vec<Deployment>> {
        self.record(GatewayCall::List(scope.clone()), deadline)?;

        let deployments = self.deployments.lock().unwrap();
        Ok(deployments
            .iter()
            .filter(|(workload, _)| match scope {
                NamespaceScope::All => true,
                NamespaceScope::One(namespace) => &workload.namespace == namespace,
            })
            .map(|(_, deployment)| deployment.clone())
            .collect())
    }

    async fn replace(
        &self,
        workload: &WorkloadRef,
        deployment: &Deployment,
        deadline: Instant,
    ) -> Result<Deployment> {
        self.record(GatewayCall::Replace(workload.clone()), deadline)?;

        if self.stall_next_replace.swap(false, Ordering::SeqCst) {
            sleep_until(deadline).await;
            return DeadlineExceededSnafu.fail();
        }

        let mut deployments = self.deployments.lock().unwrap();
        let stored = deployments
            .get_mut(workload)
            .context(NotFoundSnafu {
                workload: workload.clone(),
            })?;

        if self
            .concurrent_write_before_replace
            .swap(false, Ordering::SeqCst)
        {
            bump_resource_version(stored);
        }

        if stored.metadata.resource_version != deployment.metadata.resource_version {
            return ConflictSnafu {
                workload: workload.clone(),
                message: format!(
                    "Operation cannot be fulfilled on deployments.apps {name:?}: the object has been modified; please apply your changes to the latest version and try again",
                    name = workload.name
                ),
            }
            .fail();
        }

        let mut replaced = deployment.clone();
        replaced.metadata.resource_version = stored.metadata.resource_version.clone();
        bump_resource_version(&mut replaced);
        *stored = replaced.clone();

        Ok(replaced)
    }
}

fn workload_of(deployment: &Deployment) -> WorkloadRef {
    WorkloadRef::new(
        deployment.metadata.namespace.clone().unwrap_or_default(),
        deployment.metadata.name.clone().unwrap_or_default(),
    )
}

fn bump_resource_version(deployment: &mut Deployment) {
    let version = deployment
        .metadata
        .resource_version
        .as_deref()
        .and_then(|version| version.parse::<u64>().ok())
        .unwrap_or_default();
    deployment.metadata.resource_version = Some((version + 1).to_string());
}

/// Builds a Deployment with the given container and volume names.
pub fn deployment(namespace: &str, name: &str, containers: &[&str], volumes: &[&str]) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(namespace.to_owned()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: containers
                        .iter()
                        .map(|name| Container {
                            name: (*name).to_owned(),
                            image: Some(format!("registry.example.com/{name}:latest")),
                            ..Default::default()
                        })
                        .collect(),
                    volumes: Some(
                        volumes
                            .iter()
                            .map(|name| Volume {
                                name: (*name).to_owned(),
                                ..Default::default()
                            })
                            .collect(),
                    ),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gateway::GatewayError;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn rejects_stale_replace() {
        let gateway = InMemoryGateway::with_deployments([deployment("ns", "web", &["web"], &[])]);
        let workload = WorkloadRef::new("ns", "web");

        let first = gateway.get(&workload, deadline()).await.unwrap();
        let second = gateway.get(&workload, deadline()).await.unwrap();

        gateway.replace(&workload, &first, deadline()).await.unwrap();
        let error = gateway
            .replace(&workload, &second, deadline())
            .await
            .unwrap_err();

        assert!(matches!(error, GatewayError::Conflict { .. }));
    }

    #[tokio::test]
    async fn fails_calls_past_their_deadline() {
        let gateway = InMemoryGateway::with_deployments([deployment("ns", "web", &["web"], &[])]);

        let error = gateway
            .get(&WorkloadRef::new("ns", "web"), Instant::now())
            .await
            .unwrap_err();

        assert!(matches!(error, GatewayError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn stalled_replace_stores_nothing() {
        let gateway = InMemoryGateway::with_deployments([deployment("ns", "web", &["web"], &[])]);
        let workload = WorkloadRef::new("ns", "web");
        let mut changed = gateway.get(&workload, deadline()).await.unwrap();
        changed.metadata.labels = Some([("debug".to_owned(), "true".to_owned())].into());

        gateway.stall_next_replace();
        let error = gateway
            .replace(&workload, &changed, Instant::now() + Duration::from_millis(10))
            .await
            .unwrap_err();

        assert!(matches!(error, GatewayError::DeadlineExceeded));
        let stored = gateway.get(&workload, deadline()).await.unwrap();
        assert_eq!(stored.metadata.labels, None);
        assert_eq!(stored.metadata.resource_version.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn lists_one_namespace() {
        let gateway = InMemoryGateway::with_deployments([
            deployment("a", "web", &["web"], &[]),
            deployment("b", "api", &["api"], &[]),
        ]);

        let listed = gateway
            .list(&NamespaceScope::One("b".to_owned()), deadline())
            .await
            .unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].metadata.name.as_deref(), Some("api"));
    }
}
