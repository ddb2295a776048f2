use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::notification::{Notification, TargetType};
use crate::models::user::User;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/notifications", get(list_notifications))
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub phone: String,
    pub location: Option<GeoPoint>,
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<User>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if let Some(location) = &payload.location {
        location.validate()?;
    }

    let user = User {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        phone: payload.phone,
        location: payload.location,
        created_at: Utc::now(),
    };

    state.users.insert(user.id, user.clone());
    Ok(Json(user))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.load_user(id)?))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Notification>>, AppError> {
    state.load_user(id)?;
    Ok(Json(state.notifications.list(TargetType::User, id)))
}
