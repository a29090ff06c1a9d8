use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Request, rejection::BytesRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::json;
use snafu::{ResultExt, Snafu};
use strum::Display;

use crate::engine;

/// The API operation an engine error happened in, rendered as the prefix of
/// the error message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Operation {
    #[strum(to_string = "Error getting deployments")]
    GetDeployments,

    #[strum(to_string = "Error getting single deployment")]
    GetSingleDeployment,

    #[strum(to_string = "Error on setting sidecar")]
    SetSidecar,

    #[strum(to_string = "Error clearing sidecar")]
    ClearSidecar,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum ApiError {
    #[snafu(display("failed to read request body"))]
    ReadBody { source: BytesRejection },

    #[snafu(display("failed to deserialize request body"))]
    DeserializeBody { source: serde_json::Error },

    #[snafu(display("missing or invalid API key"))]
    Unauthorized,

    #[snafu(display("{operation}"))]
    Operation {
        source: engine::Error,
        operation: Operation,
    },
}

impl ApiError {
    /// The status code and the message of the `{"error": ...}` envelope.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::ReadBody { .. } | Self::DeserializeBody { .. } => {
                (StatusCode::BAD_REQUEST, "Error binding JSON".to_owned())
            }
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_owned()),
            Self::Operation { .. } => (StatusCode::BAD_REQUEST, error_chain(self)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Operation { source, .. } => tracing::error!(
                error = &self as &dyn std::error::Error,
                error.kind = %source.kind(),
                "request failed"
            ),
            Self::Unauthorized => tracing::warn!("rejected request without valid API key"),
            _ => tracing::info!(
                error = &self as &dyn std::error::Error,
                "rejected malformed request body"
            ),
        }

        let (status, message) = self.status_and_message();
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Joins the messages of an error and all of its sources with `": "`.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(error) = source {
        message.push_str(": ");
        message.push_str(&error.to_string());
        source = error.source();
    }
    message
}

/// A JSON request body.
///
/// Unlike [`Json`] it does not insist on a `Content-Type` header, and every
/// rejection turns into the generic binding error of the API.
#[derive(Debug)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(request, state)
            .await
            .context(ReadBodySnafu)?;
        let payload = serde_json::from_slice(&body).context(DeserializeBodySnafu)?;

        Ok(Self(payload))
    }
}
