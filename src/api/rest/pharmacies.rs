use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::notification::{Notification, TargetType};
use crate::models::pharmacy::{Pharmacy, PharmacyStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pharmacies", post(create_pharmacy).get(list_pharmacies))
        .route("/pharmacies/:id", get(get_pharmacy))
        .route("/pharmacies/:id/status", patch(update_status))
        .route("/pharmacies/:id/notifications", get(list_notifications))
}

#[derive(Deserialize)]
pub struct CreatePharmacyRequest {
    pub name: String,
    pub vendor_name: String,
    #[serde(default)]
    pub vendor_email: String,
    #[serde(default)]
    pub vendor_phone: String,
    #[serde(default)]
    pub address: String,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub categories: Vec<String>,
    /// New pharmacies wait for approval unless created already active.
    pub status: Option<PharmacyStatus>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: PharmacyStatus,
}

async fn create_pharmacy(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePharmacyRequest>,
) -> Result<Json<Pharmacy>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if let Some(location) = &payload.location {
        location.validate()?;
    }

    let now = Utc::now();
    let pharmacy = Pharmacy {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        vendor_name: payload.vendor_name,
        vendor_email: payload.vendor_email,
        vendor_phone: payload.vendor_phone,
        address: payload.address,
        location: payload.location,
        categories: payload.categories,
        status: payload.status.unwrap_or(PharmacyStatus::Pending),
        created_at: now,
        updated_at: now,
    };

    state.pharmacies.insert(pharmacy.id, pharmacy.clone());
    info!(pharmacy_id = %pharmacy.id, status = ?pharmacy.status, "pharmacy registered");
    Ok(Json(pharmacy))
}

async fn list_pharmacies(State(state): State<Arc<AppState>>) -> Json<Vec<Pharmacy>> {
    let pharmacies = state
        .pharmacies
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(pharmacies)
}

async fn get_pharmacy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Pharmacy>, AppError> {
    Ok(Json(state.load_pharmacy(id)?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Pharmacy>, AppError> {
    let mut pharmacy = state
        .pharmacies
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("pharmacy {id} not found")))?;

    pharmacy.status = payload.status;
    pharmacy.updated_at = Utc::now();

    info!(pharmacy_id = %id, status = ?payload.status, "pharmacy status changed");
    Ok(Json(pharmacy.clone()))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Notification>>, AppError> {
    state.load_pharmacy(id)?;
    Ok(Json(state.notifications.list(TargetType::Vendor, id)))
}
