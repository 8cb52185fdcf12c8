use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ppda_core::ValidationError;
use ppda_storage::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every failure the API reports, rendered as
/// `{"error": {"code", "message", "details"?}}`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Las credenciales de autenticación no se proveyeron o son inválidas.")]
    Unauthorized,
    #[error("Usted no tiene permiso para realizar esta acción.")]
    Forbidden,
    #[error("No encontrado.")]
    NotFound,
    #[error("Los datos enviados no son válidos.")]
    Validation(ValidationError),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Ingestion failures keep the status chosen by the trigger endpoint.
    #[error("{message}")]
    Ingestion { status: StatusCode, message: String },
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::Unique { .. } | StoreError::ForeignKey { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Ingestion { status, .. } => *status,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Validation(_) => "validation_error",
            Self::BadRequest(_) => "bad_request",
            Self::Store(StoreError::Unique { .. }) => "unique_violation",
            Self::Store(StoreError::ForeignKey { .. }) => "invalid_reference",
            Self::Store(_) | Self::Internal(_) => "internal_error",
            Self::Ingestion { status, .. } if status.is_client_error() => "validation_error",
            Self::Ingestion { .. } => "ingestion_failed",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(err) => serde_json::to_value(err).ok(),
            Self::Store(err) => err.field().map(|field| {
                let fields = BTreeMap::from([(field.to_string(), vec![err.to_string()])]);
                json!(fields)
            }),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Store(err) if status.is_server_error() => {
                error!(error = %err, "store failure");
                "Error interno del servidor.".to_string()
            }
            other => other.to_string(),
        };
        let mut body = json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        });
        if let Some(details) = self.details() {
            body["error"]["details"] = details;
        }
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_carry_field_details() {
        let err = ValidationError::field("avance", "El avance debe estar entre 0 y 100.");
        let (status, body) = body_of(AppError::from(err)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_error");
        assert_eq!(body["error"]["details"]["avance"][0], "El avance debe estar entre 0 y 100.");
    }

    #[tokio::test]
    async fn unique_violations_are_client_errors() {
        let err = StoreError::Unique {
            field: "nombre".into(),
        };
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "unique_violation");
        assert!(body["error"]["details"]["nombre"].is_array());
    }
}
