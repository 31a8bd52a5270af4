use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::application::AppError;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::InvalidExpense(_) | AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ExpenseNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Overloaded { .. } | AppError::StorageUnreachable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::CorruptState(_) | AppError::Rejected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.is_client_error() {
            debug!(error = %self, "Rejected request");
        } else if status == StatusCode::SERVICE_UNAVAILABLE {
            warn!(error = %self, "Ledger unavailable");
        } else {
            error!(error = %self, "Ledger failure");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
