use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::lifecycle::{
    self, Actor, CodDetails, Decision, PlaceOrder, RouteEstimate,
};
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::order::{OrderStatus, OrderView, TransitionOutcome};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order).delete(delete_order))
        .route("/orders/:id/vendor-response", post(vendor_response))
        .route("/orders/:id/rider-response", post(rider_response))
        .route("/orders/:id/pickup-proof", post(pickup_proof))
        .route("/orders/:id/delivery-proof", post(delivery_proof))
        .route("/orders/:id/picked-up", post(picked_up))
        .route("/orders/:id/delivered", post(delivered))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/reject", post(reject_order))
        .route("/orders/:id/refund", post(refund_order))
        .route("/orders/:id/fail", post(fail_order))
        .route("/orders/:id/route", get(route_estimate))
        .route("/assignments", get(list_assignments))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub user_id: Option<Uuid>,
    pub rider_id: Option<Uuid>,
    pub pharmacy_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct VendorResponseRequest {
    pub pharmacy_id: Uuid,
    pub decision: Decision,
}

#[derive(Deserialize)]
pub struct RiderResponseRequest {
    pub rider_id: Uuid,
    pub decision: Decision,
}

#[derive(Deserialize)]
pub struct ProofRequest {
    pub rider_id: Uuid,
    pub image_url: String,
}

#[derive(Deserialize)]
pub struct RiderActionRequest {
    pub rider_id: Uuid,
}

#[derive(Deserialize)]
pub struct DeliveredRequest {
    pub rider_id: Uuid,
    pub cod: Option<CodDetails>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    /// Absent for admin cancellations.
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PlaceOrder>,
) -> Result<Json<OrderView>, AppError> {
    let order = lifecycle::place_order(&state, payload, Utc::now())?;
    Ok(Json(order.into()))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Json<Vec<OrderView>> {
    let mut orders: Vec<OrderView> = state
        .orders
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|order| query.status.is_none_or(|status| order.status == status))
        .filter(|order| query.user_id.is_none_or(|id| order.user_id == id))
        .filter(|order| query.rider_id.is_none_or(|id| order.assigned_rider == Some(id)))
        .filter(|order| query.pharmacy_id.is_none_or(|id| order.assigned_pharmacy == Some(id)))
        .map(OrderView::from)
        .collect();
    orders.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at));

    Json(orders)
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(state.load_order(id)?.into()))
}

async fn delete_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, AppError> {
    Ok(Json(lifecycle::delete_order(&state, id)?.into()))
}

async fn vendor_response(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VendorResponseRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let outcome =
        lifecycle::vendor_respond(&state, id, payload.pharmacy_id, payload.decision, Utc::now())?;
    Ok(Json(outcome))
}

async fn rider_response(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RiderResponseRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let outcome =
        lifecycle::rider_respond(&state, id, payload.rider_id, payload.decision, Utc::now())?;
    Ok(Json(outcome))
}

async fn pickup_proof(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProofRequest>,
) -> Result<Json<OrderView>, AppError> {
    let order = lifecycle::attach_pickup_proof(
        &state,
        id,
        payload.rider_id,
        &payload.image_url,
        Utc::now(),
    )?;
    Ok(Json(order.into()))
}

async fn delivery_proof(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProofRequest>,
) -> Result<Json<OrderView>, AppError> {
    let order = lifecycle::attach_delivery_proof(
        &state,
        id,
        payload.rider_id,
        &payload.image_url,
        Utc::now(),
    )?;
    Ok(Json(order.into()))
}

async fn picked_up(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RiderActionRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    Ok(Json(lifecycle::mark_picked_up(&state, id, payload.rider_id, Utc::now())?))
}

async fn delivered(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeliveredRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let outcome = lifecycle::mark_delivered(&state, id, payload.rider_id, payload.cod, Utc::now())?;
    Ok(Json(outcome))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let actor = match payload.user_id {
        Some(user_id) => Actor::User(user_id),
        None => Actor::Admin,
    };
    let reason = non_empty(payload.reason, "cancelled");
    Ok(Json(lifecycle::cancel(&state, id, actor, &reason, Utc::now())?))
}

async fn reject_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let reason = non_empty(payload.reason, "rejected by admin");
    Ok(Json(lifecycle::reject(&state, id, &reason, Utc::now())?))
}

async fn refund_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let reason = non_empty(payload.reason, "refund issued");
    Ok(Json(lifecycle::refund(&state, id, &reason, Utc::now())?))
}

async fn fail_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReasonRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let reason = non_empty(payload.reason, "delivery failed");
    Ok(Json(lifecycle::fail_delivery(&state, id, &reason, Utc::now())?))
}

async fn route_estimate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RouteEstimate>, AppError> {
    Ok(Json(lifecycle::route_estimate(&state, id, Utc::now())?))
}

async fn list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<Assignment>> {
    let mut assignments: Vec<Assignment> = state
        .assignments
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    assignments.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));

    Json(assignments)
}

fn non_empty(reason: String, fallback: &str) -> String {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
