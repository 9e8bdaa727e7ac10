//! API error types with HTTP response mapping.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use inventory::InventoryError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
///
/// `InsufficientStock` is deliberately absent: the reserve endpoints report
/// it as HTTP 200 with `success: false` so storefront UIs can render the
/// rejection inline, and the handlers translate it before it gets here.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or wrong admin bearer token.
    Unauthorized,
    /// Resource not found.
    NotFound(String),
    /// The request conflicts with current state (e.g. status transition).
    Conflict(String),
    /// The caller is over their request budget.
    RateLimited { retry_after_secs: u64 },
    /// A backing store is unreachable; the client should retry later.
    Upstream(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Missing or invalid bearer token".to_string(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("Too many requests, retry in {retry_after_secs}s"),
            ),
            ApiError::Upstream(msg) => {
                tracing::warn!(error = %msg, "upstream store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    format!("{msg}; please retry"),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = serde_json::json!({ "error": message });
        let mut response = (status, axum::Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self
            && let Ok(value) = retry_after_secs.to_string().parse()
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::ProductNotFound(_) => ApiError::NotFound(err.to_string()),
            InventoryError::EmptyHolder
            | InventoryError::InvalidQuantity { .. }
            | InventoryError::NoItems => ApiError::BadRequest(err.to_string()),
            // An insufficient-stock rejection that escaped handler-level
            // translation (e.g. checkout submission) is a state conflict.
            InventoryError::InsufficientStock { .. } => ApiError::Conflict(err.to_string()),
            InventoryError::ConflictRetriesExhausted { .. } => ApiError::Upstream(err.to_string()),
            InventoryError::Store(store_err) => store_err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::ProductNotFound(_) | StoreError::OrderNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            StoreError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            StoreError::RevisionConflict { .. }
            | StoreError::Database(_)
            | StoreError::Migration(_) => ApiError::Upstream(err.to_string()),
            StoreError::Serialization(_) => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_carries_retry_after() {
        let response = ApiError::RateLimited { retry_after_secs: 7 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &"7".parse::<axum::http::HeaderValue>().unwrap()
        );
    }

    #[test]
    fn inventory_errors_map_to_expected_statuses() {
        use common::ProductId;

        let not_found: ApiError =
            InventoryError::ProductNotFound(ProductId::new("p1")).into();
        assert!(matches!(not_found, ApiError::NotFound(_)));

        let bad: ApiError = InventoryError::InvalidQuantity { quantity: 0 }.into();
        assert!(matches!(bad, ApiError::BadRequest(_)));

        let retry: ApiError = InventoryError::ConflictRetriesExhausted {
            product_id: ProductId::new("p1"),
            attempts: 3,
        }
        .into();
        assert!(matches!(retry, ApiError::Upstream(_)));
    }
}
