use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{BillingError, ValidationErrors};

/// JSON error body: a summary plus per-field messages.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub fields: ValidationErrors,
}

/// A `BillingError` on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub BillingError);

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BillingError::Validation(_)
            | BillingError::IllegalTransition { .. }
            | BillingError::Money(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BillingError::NotDestroyable { .. } | BillingError::NotUpdatable { .. } => {
                StatusCode::CONFLICT
            }
            BillingError::NotFound { .. } => StatusCode::NOT_FOUND,
            BillingError::Delivery(_) => StatusCode::BAD_GATEWAY,
            BillingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {:#}", self.0);
            match &self.0 {
                BillingError::Delivery(_) => "delivery failed".to_string(),
                _ => "internal server error".to_string(),
            }
        } else {
            warn!("Request rejected: {}", self.0);
            self.0.to_string()
        };

        let body = ErrorBody {
            error: message,
            fields: self.0.field_errors(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_rule_violations_map_to_client_errors() {
        let cases = [
            (BillingError::invalid("reason", "can't be blank"), StatusCode::UNPROCESSABLE_ENTITY),
            (
                BillingError::NotUpdatable {
                    entity: "client session",
                    id: Uuid::nil(),
                    reason: "cannot change once invoice sent or paid".into(),
                },
                StatusCode::CONFLICT,
            ),
            (BillingError::not_found("invoice", Uuid::nil()), StatusCode::NOT_FOUND),
            (
                BillingError::Delivery(anyhow::anyhow!("smtp down")),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
