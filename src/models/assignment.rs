use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentTarget {
    Rider,
    Pharmacy,
}

impl AssignmentTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentTarget::Rider => "rider",
            AssignmentTarget::Pharmacy => "pharmacy",
        }
    }
}

/// Audit record of one successful selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub target: AssignmentTarget,
    pub candidate_id: Uuid,
    pub distance_km: f64,
    pub assigned_at: DateTime<Utc>,
}
