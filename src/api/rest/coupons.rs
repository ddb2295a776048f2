use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::coupon::Coupon;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/coupons", post(create_coupon).get(list_coupons))
}

#[derive(Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub discount_percentage: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
}

async fn create_coupon(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCouponRequest>,
) -> Result<Json<Coupon>, AppError> {
    let code = payload.code.trim().to_string();
    if code.is_empty() {
        return Err(AppError::BadRequest("code cannot be empty".to_string()));
    }
    if payload.discount_percentage < Decimal::ZERO
        || payload.discount_percentage > Decimal::ONE_HUNDRED
    {
        return Err(AppError::BadRequest(format!(
            "discount_percentage {} must be within 0..=100",
            payload.discount_percentage
        )));
    }

    let coupon = Coupon {
        code: code.clone(),
        discount_percentage: payload.discount_percentage,
        expires_at: payload.expires_at,
        created_at: Utc::now(),
    };

    match state.coupons.entry(code) {
        Entry::Occupied(entry) => Err(AppError::InvalidState(format!(
            "coupon {} already exists",
            entry.key()
        ))),
        Entry::Vacant(entry) => {
            entry.insert(coupon.clone());
            Ok(Json(coupon))
        }
    }
}

async fn list_coupons(State(state): State<Arc<AppState>>) -> Json<Vec<Coupon>> {
    let coupons = state.coupons.iter().map(|entry| entry.value().clone()).collect();
    Json(coupons)
}
