use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("no {0} available")]
    NoCandidateAvailable(&'static str),

    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("invalid line item: {0}")]
    InvalidLineItem(String),

    #[error("order {0} was modified concurrently")]
    ConcurrentModification(Uuid),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable kind, carried in every error body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::InsufficientFunds { .. } => "insufficient_funds",
            AppError::NoCandidateAvailable(_) => "no_candidate_available",
            AppError::InvalidCoordinate(_) => "invalid_coordinate",
            AppError::InvalidLineItem(_) => "invalid_line_item",
            AppError::ConcurrentModification(_) => "concurrent_modification",
            AppError::BadRequest(_) => "bad_request",
            AppError::Forbidden(_) => "forbidden",
            AppError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_) | AppError::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            AppError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NoCandidateAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidCoordinate(_)
            | AppError::InvalidLineItem(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use uuid::Uuid;

    #[test]
    fn lost_race_maps_to_conflict() {
        let response = AppError::ConcurrentModification(Uuid::nil()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn exhausted_pool_maps_to_service_unavailable() {
        let err = AppError::NoCandidateAvailable("rider");
        assert_eq!(err.kind(), "no_candidate_available");
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
