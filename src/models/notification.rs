use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    User,
    Rider,
    Vendor,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::User => "user",
            TargetType::Rider => "rider",
            TargetType::Vendor => "vendor",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub message: String,
    pub order_id: Option<Uuid>,
    pub order_status: Option<OrderStatus>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
