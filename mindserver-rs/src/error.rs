use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mindserver_sdk_rs::gateway::GatewayError;
use serde_json::json;
use tracing::error;

/// HTTP face of a gateway failure: `{"error": message}` with a status that
/// separates caller mistakes from upstream trouble.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::UnknownProvider(_)
            | GatewayError::ProviderNotConfigured(_)
            | GatewayError::Unsupported { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
