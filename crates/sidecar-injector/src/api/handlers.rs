use axum::{Json, extract::State};
use serde_json::{Value, json};
use snafu::ResultExt;

use super::{
    ApiState,
    error::{ApiError, Operation, OperationSnafu, Payload},
    payloads::{
        ClearSidecarPayload, GetDeploymentsPayload, GetSingleDeploymentPayload, SetSidecarPayload,
    },
};
use crate::workload::{SidecarRemovalSpec, SidecarSpec, WorkloadRef, WorkloadSummary};

type Result<T, E = ApiError> = std::result::Result<T, E>;

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Kubernetes OnDemand Sidecar Injector API up & running" }))
}

pub async fn get_deployments(
    State(state): State<ApiState>,
    Payload(payload): Payload<GetDeploymentsPayload>,
) -> Result<Json<Vec<WorkloadSummary>>> {
    tracing::info!(?payload, "received GetDeployments request");

    let summaries = state
        .engine
        .list(&payload.into())
        .await
        .context(OperationSnafu {
            operation: Operation::GetDeployments,
        })?;

    Ok(Json(summaries))
}

pub async fn get_single_deployment(
    State(state): State<ApiState>,
    Payload(payload): Payload<GetSingleDeploymentPayload>,
) -> Result<Json<WorkloadSummary>> {
    tracing::info!(?payload, "received GetSingleDeployment request");

    let summary = state
        .engine
        .get(&WorkloadRef::from(payload))
        .await
        .context(OperationSnafu {
            operation: Operation::GetSingleDeployment,
        })?;

    Ok(Json(summary))
}

pub async fn set_sidecar(
    State(state): State<ApiState>,
    Payload(payload): Payload<SetSidecarPayload>,
) -> Result<Json<WorkloadSummary>> {
    tracing::info!(?payload, "received SetSidecar request");

    let summary = state
        .engine
        .attach(&SidecarSpec::from(payload))
        .await
        .context(OperationSnafu {
            operation: Operation::SetSidecar,
        })?;

    Ok(Json(summary))
}

pub async fn clear_sidecar(
    State(state): State<ApiState>,
    Payload(payload): Payload<ClearSidecarPayload>,
) -> Result<Json<WorkloadSummary>> {
    tracing::info!(?payload, "received ClearSidecar request");

    let summary = state
        .engine
        .detach(&SidecarRemovalSpec::from(payload))
        .await
        .context(OperationSnafu {
            operation: Operation::ClearSidecar,
        })?;

    Ok(Json(summary))
}
