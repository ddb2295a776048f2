use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::withdrawals;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::notification::{Notification, TargetType};
use crate::models::rider::{
    Availability, BankAccount, LicenseStatus, Rider, Wallet, WalletTransaction,
};
use crate::models::withdrawal::WithdrawalRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", post(create_rider).get(list_riders))
        .route("/riders/:id", get(get_rider))
        .route("/riders/:id/license", patch(update_license))
        .route("/riders/:id/availability", patch(update_availability))
        .route("/riders/:id/location", patch(update_location))
        .route("/riders/:id/base-fare", patch(update_base_fare))
        .route("/riders/:id/bank-accounts", post(add_bank_account).get(list_bank_accounts))
        .route("/riders/:id/wallet", get(get_wallet))
        .route("/riders/:id/notifications", get(list_notifications))
        .route("/riders/:id/notifications/read", post(mark_notifications_read))
        .route("/riders/:id/withdrawals", post(request_withdrawal).get(list_withdrawals))
        .route("/base-fare", get(current_base_fare))
        .route("/admin/base-fare", patch(set_base_fare_for_all))
}

#[derive(Deserialize)]
pub struct CreateRiderRequest {
    pub name: String,
    pub phone: String,
    pub location: Option<GeoPoint>,
    pub capacity: Option<u8>,
}

#[derive(Deserialize)]
pub struct UpdateLicenseRequest {
    pub status: LicenseStatus,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub availability: Availability,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct BaseFareRequest {
    pub base_fare: Decimal,
}

#[derive(Deserialize)]
pub struct BankAccountRequest {
    pub account_holder_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: String,
    pub upi_id: Option<String>,
}

#[derive(Deserialize)]
pub struct WithdrawalRequestBody {
    pub amount: Decimal,
    pub bank_account_id: Uuid,
}

#[derive(Serialize)]
pub struct BaseFareResponse {
    pub base_fare: Decimal,
}

#[derive(Serialize)]
pub struct BulkBaseFareResponse {
    pub base_fare: Decimal,
    pub riders_updated: usize,
}

#[derive(Serialize)]
pub struct WalletResponse {
    pub rider_id: Uuid,
    pub balance: Decimal,
    pub transactions: Vec<WalletTransaction>,
}

#[derive(Serialize)]
pub struct MarkedRead {
    pub marked: usize,
}

async fn create_rider(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRiderRequest>,
) -> Result<Json<Rider>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.phone.trim().is_empty() {
        return Err(AppError::BadRequest("phone cannot be empty".to_string()));
    }
    if let Some(location) = &payload.location {
        location.validate()?;
    }

    let capacity = payload.capacity.unwrap_or(state.config.dispatch.rider_default_capacity);
    if capacity == 0 {
        return Err(AppError::BadRequest("capacity must be > 0".to_string()));
    }

    let now = Utc::now();
    let rider = Rider {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        phone: payload.phone.trim().to_string(),
        availability: Availability::Offline,
        license_status: LicenseStatus::Pending,
        location: payload.location,
        base_fare: None,
        capacity,
        active_orders: 0,
        wallet: Wallet::default(),
        bank_accounts: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    state.riders.insert(rider.id, rider.clone());
    info!(rider_id = %rider.id, "rider signed up");
    Ok(Json(rider))
}

async fn list_riders(State(state): State<Arc<AppState>>) -> Json<Vec<Rider>> {
    let riders = state.riders.iter().map(|entry| entry.value().clone()).collect();
    Json(riders)
}

async fn get_rider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    Ok(Json(state.load_rider(id)?))
}

async fn update_license(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLicenseRequest>,
) -> Result<Json<Rider>, AppError> {
    let mut rider = state
        .riders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))?;

    rider.license_status = payload.status;
    if payload.status != LicenseStatus::Approved {
        rider.availability = Availability::Offline;
    }
    rider.updated_at = Utc::now();

    info!(rider_id = %id, license = ?payload.status, "rider license decided");
    Ok(Json(rider.clone()))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Rider>, AppError> {
    let mut rider = state
        .riders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))?;

    if payload.availability == Availability::Online
        && rider.license_status != LicenseStatus::Approved
    {
        return Err(AppError::Forbidden(format!(
            "rider {id} cannot go online with license {:?}",
            rider.license_status
        )));
    }

    rider.availability = payload.availability;
    rider.updated_at = Utc::now();

    Ok(Json(rider.clone()))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Rider>, AppError> {
    payload.location.validate()?;

    let mut rider = state
        .riders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))?;

    rider.location = Some(payload.location);
    rider.updated_at = Utc::now();

    Ok(Json(rider.clone()))
}

fn validate_base_fare(base_fare: Decimal) -> Result<(), AppError> {
    if base_fare.is_sign_negative() {
        return Err(AppError::BadRequest(format!(
            "base fare {base_fare} must not be negative"
        )));
    }
    Ok(())
}

async fn update_base_fare(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BaseFareRequest>,
) -> Result<Json<Rider>, AppError> {
    validate_base_fare(payload.base_fare)?;

    let mut rider = state
        .riders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))?;

    rider.base_fare = Some(payload.base_fare);
    rider.updated_at = Utc::now();

    Ok(Json(rider.clone()))
}

async fn current_base_fare(State(state): State<Arc<AppState>>) -> Json<BaseFareResponse> {
    Json(BaseFareResponse {
        base_fare: state.platform_base_fare(),
    })
}

async fn set_base_fare_for_all(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BaseFareRequest>,
) -> Result<Json<BulkBaseFareResponse>, AppError> {
    validate_base_fare(payload.base_fare)?;

    state.set_platform_base_fare(payload.base_fare);

    let now = Utc::now();
    let mut riders_updated = 0;
    for mut rider in state.riders.iter_mut() {
        rider.base_fare = Some(payload.base_fare);
        rider.updated_at = now;
        riders_updated += 1;
    }

    info!(base_fare = %payload.base_fare, riders_updated, "base fare set for all riders");
    Ok(Json(BulkBaseFareResponse {
        base_fare: payload.base_fare,
        riders_updated,
    }))
}

async fn add_bank_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BankAccountRequest>,
) -> Result<Json<BankAccount>, AppError> {
    if payload.account_number.trim().is_empty() || payload.ifsc_code.trim().is_empty() {
        return Err(AppError::BadRequest(
            "account_number and ifsc_code are required".to_string(),
        ));
    }

    let mut rider = state
        .riders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))?;

    let account = BankAccount {
        id: Uuid::new_v4(),
        account_holder_name: payload.account_holder_name,
        account_number: payload.account_number.trim().to_string(),
        ifsc_code: payload.ifsc_code.trim().to_uppercase(),
        bank_name: payload.bank_name,
        upi_id: payload.upi_id,
    };
    rider.bank_accounts.push(account.clone());
    rider.updated_at = Utc::now();

    Ok(Json(account))
}

async fn list_bank_accounts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BankAccount>>, AppError> {
    Ok(Json(state.load_rider(id)?.bank_accounts))
}

async fn get_wallet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WalletResponse>, AppError> {
    let rider = state.load_rider(id)?;
    Ok(Json(WalletResponse {
        rider_id: rider.id,
        balance: rider.wallet.balance(),
        transactions: rider.wallet.transactions().to_vec(),
    }))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Notification>>, AppError> {
    state.load_rider(id)?;
    Ok(Json(state.notifications.list(TargetType::Rider, id)))
}

async fn mark_notifications_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MarkedRead>, AppError> {
    state.load_rider(id)?;
    Ok(Json(MarkedRead {
        marked: state.notifications.mark_read(TargetType::Rider, id),
    }))
}

async fn request_withdrawal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WithdrawalRequestBody>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    let request = withdrawals::request_withdrawal(
        &state,
        id,
        payload.amount,
        payload.bank_account_id,
        Utc::now(),
    )?;
    Ok(Json(request))
}

async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<WithdrawalRequest>>, AppError> {
    state.load_rider(id)?;
    Ok(Json(withdrawals::list_withdrawals(&state, Some(id))))
}
