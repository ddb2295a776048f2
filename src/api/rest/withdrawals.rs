use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::withdrawals::{self, WithdrawalDecision};
use crate::error::AppError;
use crate::models::withdrawal::WithdrawalRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/withdrawals", get(list_withdrawals))
        .route("/withdrawals/:id/approve", post(approve))
        .route("/withdrawals/:id/reject", post(reject))
}

#[derive(Deserialize)]
pub struct ListWithdrawalsQuery {
    pub rider_id: Option<Uuid>,
}

async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListWithdrawalsQuery>,
) -> Json<Vec<WithdrawalRequest>> {
    Json(withdrawals::list_withdrawals(&state, query.rider_id))
}

async fn approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WithdrawalDecision>, AppError> {
    Ok(Json(withdrawals::approve_withdrawal(&state, id, Utc::now())?))
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    Ok(Json(withdrawals::reject_withdrawal(&state, id, Utc::now())?))
}
