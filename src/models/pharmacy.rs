use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PharmacyStatus {
    Pending,
    Active,
    Suspended,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pharmacy {
    pub id: Uuid,
    pub name: String,
    pub vendor_name: String,
    pub vendor_email: String,
    pub vendor_phone: String,
    pub address: String,
    pub location: Option<GeoPoint>,
    pub categories: Vec<String>,
    pub status: PharmacyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pharmacy {
    pub fn accepts_orders(&self) -> bool {
        self.status == PharmacyStatus::Active
    }
}
