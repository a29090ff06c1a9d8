//! An HTTP API which attaches debug sidecar containers to running Kubernetes
//! Deployments and detaches them again.
//!
//! Requests are handled by the [`api`] router, which delegates to the
//! [`engine::SidecarEngine`]. The engine reads and replaces Deployments
//! through a [`gateway::WorkloadGateway`], which is backed by the Kubernetes
//! API in production.
pub mod api;
pub mod cli;
pub mod client;
pub mod engine;
pub mod gateway;
pub mod naming;
pub mod server;
pub mod workload;
