//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use cache::CacheBackend;
use checkout::{CheckoutEngine, CheckoutItem, CheckoutRequest, CheckoutResult};
use common::{CartId, CouponCode, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use store::CheckoutStore;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, C>
where
    S: CheckoutStore,
    C: CacheBackend,
{
    pub engine: CheckoutEngine<S, C>,
}

// -- Request types --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutBody {
    pub user_id: String,
    pub cart_id: String,
    pub items: Vec<CheckoutItemBody>,
    pub coupon: Option<String>,
    pub payment_ref: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutItemBody {
    pub product_id: String,
    pub qty: u32,
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: String,
    pub status: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl From<CheckoutResult> for CheckoutResponse {
    fn from(result: CheckoutResult) -> Self {
        Self {
            order_id: result.order_id.to_string(),
            status: result.status.to_string(),
            total: result.total,
        }
    }
}

impl CheckoutBody {
    /// Checks required fields and parses identifiers.
    pub fn into_request(self) -> Result<CheckoutRequest, ApiError> {
        if self.user_id.is_empty() || self.cart_id.is_empty() || self.payment_ref.is_empty() {
            return Err(ApiError::BadRequest(
                "userId, cartId, and paymentRef are required".to_string(),
            ));
        }
        if self.items.is_empty() {
            return Err(ApiError::BadRequest("items are required".to_string()));
        }

        let user_id = UserId::parse(&self.user_id)
            .map_err(|_| ApiError::BadRequest(format!("Invalid userId: {}", self.user_id)))?;
        let cart_id = CartId::parse(&self.cart_id)
            .map_err(|_| ApiError::BadRequest(format!("Invalid cartId: {}", self.cart_id)))?;
        let items = self
            .items
            .into_iter()
            .map(|item| {
                let product_id = ProductId::parse(&item.product_id).map_err(|_| {
                    ApiError::BadRequest(format!("Invalid productId: {}", item.product_id))
                })?;
                if item.qty == 0 {
                    return Err(ApiError::BadRequest(format!(
                        "qty must be positive for productId: {}",
                        item.product_id
                    )));
                }
                Ok(CheckoutItem {
                    product_id,
                    qty: item.qty,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CheckoutRequest {
            user_id,
            cart_id,
            items,
            coupon: self
                .coupon
                .filter(|code| !code.is_empty())
                .map(CouponCode::from),
            payment_ref: self.payment_ref,
        })
    }
}

/// POST /v1/checkout: turns the user's open cart into a pending order.
pub async fn create<S, C>(
    State(state): State<Arc<AppState<S, C>>>,
    body: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ApiError>
where
    S: CheckoutStore + 'static,
    C: CacheBackend + 'static,
{
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let request = body.into_request()?;

    let result = state.engine.checkout(&request).await?;
    Ok(Json(result.into()))
}
