//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout engine error.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    let status = match &err {
        CheckoutError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        CheckoutError::CheckoutInProgress => StatusCode::CONFLICT,
        CheckoutError::CartInvalid
        | CheckoutError::CartEmpty
        | CheckoutError::CouponInvalid
        | CheckoutError::CouponAlreadyUsed => StatusCode::BAD_REQUEST,
        CheckoutError::InsufficientInventory { .. } => StatusCode::CONFLICT,
        CheckoutError::Store(_) | CheckoutError::Cache(_) => {
            tracing::error!(error = %err, "checkout failed on infrastructure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

#[cfg(test)]
mod tests {
    use cache::CacheError;
    use common::ProductId;

    use super::*;

    fn status_of(err: CheckoutError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_checkout_errors_map_to_statuses() {
        assert_eq!(
            status_of(CheckoutError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(CheckoutError::CheckoutInProgress),
            StatusCode::CONFLICT
        );
        for err in [
            CheckoutError::CartInvalid,
            CheckoutError::CartEmpty,
            CheckoutError::CouponInvalid,
            CheckoutError::CouponAlreadyUsed,
        ] {
            assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
        }
        assert_eq!(
            status_of(CheckoutError::InsufficientInventory {
                product_id: ProductId::new()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CheckoutError::Cache(CacheError::Unavailable("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_bad_request_status() {
        let response = ApiError::BadRequest("items are required".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
