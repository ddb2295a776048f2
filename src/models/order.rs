use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;

/// Canonical order state. Replaces the old `status` / `assignedRiderStatus`
/// pair; [`OrderStatus::legacy_labels`] maps back to that vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Placed,
    PendingVendorResponse,
    VendorReassignmentPending,
    VendorAccepted,
    RiderAssignmentPending,
    RiderAssigned,
    RiderAccepted,
    PickedUp,
    Delivered,
    Rejected,
    Cancelled,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LegacyStatus {
    pub status: &'static str,
    pub rider_status: &'static str,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Rejected
                | OrderStatus::Cancelled
                | OrderStatus::Failed
                | OrderStatus::Refunded
        )
    }

    /// Non-terminal and the parcel has not left the pharmacy.
    pub fn is_before_pickup(self) -> bool {
        !self.is_terminal() && self != OrderStatus::PickedUp
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if self.is_terminal() {
            return false;
        }

        match next {
            Rejected | Cancelled | Refunded => self.is_before_pickup(),
            Failed => true,
            PendingVendorResponse => matches!(self, Placed | VendorReassignmentPending),
            VendorReassignmentPending => self == PendingVendorResponse,
            VendorAccepted => self == PendingVendorResponse,
            RiderAssignmentPending => matches!(self, VendorAccepted | RiderAssigned),
            RiderAssigned => self == RiderAssignmentPending,
            RiderAccepted => self == RiderAssigned,
            PickedUp => self == RiderAccepted,
            Delivered => self == PickedUp,
            Placed => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::PendingVendorResponse => "pending_vendor_response",
            OrderStatus::VendorReassignmentPending => "vendor_reassignment_pending",
            OrderStatus::VendorAccepted => "vendor_accepted",
            OrderStatus::RiderAssignmentPending => "rider_assignment_pending",
            OrderStatus::RiderAssigned => "rider_assigned",
            OrderStatus::RiderAccepted => "rider_accepted",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Mapping table to the storefront/rider-app vocabulary.
    pub fn legacy_labels(self) -> LegacyStatus {
        let (status, rider_status) = match self {
            OrderStatus::Placed => ("Pending", "Pending"),
            OrderStatus::PendingVendorResponse => ("Pending", "Pending"),
            OrderStatus::VendorReassignmentPending => ("Pending", "Pending"),
            OrderStatus::VendorAccepted => ("Accepted", "Pending"),
            OrderStatus::RiderAssignmentPending => ("Confirmed", "Pending"),
            OrderStatus::RiderAssigned => ("Assigned", "Assigned"),
            OrderStatus::RiderAccepted => ("Accepted", "Accepted"),
            OrderStatus::PickedUp => ("PickedUp", "PickedUp"),
            OrderStatus::Delivered => ("Delivered", "Completed"),
            OrderStatus::Rejected => ("Rejected", "Failed"),
            OrderStatus::Cancelled => ("Cancelled", "Failed"),
            OrderStatus::Failed => ("Failed", "Failed"),
            OrderStatus::Refunded => ("Refunded", "Failed"),
        };

        LegacyStatus {
            status,
            rider_status,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    OrderPlaced,
    VendorSelected,
    VendorAccepted,
    VendorRejected,
    VendorReassigned,
    NoVendorAvailable,
    RiderSearchStarted,
    RiderAssigned,
    RiderAccepted,
    RiderRejected,
    NoRiderAvailable,
    PickedUp,
    Delivered,
    CancelledByUser,
    CancelledByAdmin,
    RejectedByAdmin,
    DeliveryFailed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub reason: ReasonCode,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub medicine_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryAddress {
    #[serde(default)]
    pub house: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMethod {
    Online,
    CashOnDelivery,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Captured,
    CashOnDelivery,
    Completed,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn initial_for(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Online => PaymentStatus::Pending,
            PaymentMethod::CashOnDelivery => PaymentStatus::CashOnDelivery,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlanType {
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringPlan {
    pub plan_type: PlanType,
    pub delivery_date: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderCharges {
    pub subtotal: Decimal,
    pub delivery_charge: Decimal,
    pub platform_fee: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofAttachment {
    pub rider_id: Uuid,
    pub image_url: String,
    pub uploaded_at: DateTime<Utc>,
    pub distance_to_pharmacy_m: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CodPaymentMode {
    Cash,
    Online,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodCollection {
    pub collected_amount: Decimal,
    pub mode: CodPaymentMode,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub delivery_address: DeliveryAddress,
    pub delivery_location: GeoPoint,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub charges: OrderCharges,
    pub coupon_code: Option<String>,
    pub is_prescription_order: bool,
    pub is_reordered: bool,
    pub plan: Option<RecurringPlan>,
    pub notes: String,
    pub status: OrderStatus,
    pub assigned_rider: Option<Uuid>,
    pub assigned_pharmacy: Option<Uuid>,
    pub rejected_riders: BTreeSet<Uuid>,
    pub rejected_pharmacies: BTreeSet<Uuid>,
    pub timeline: Vec<TimelineEntry>,
    pub pickup_proofs: Vec<ProofAttachment>,
    pub delivery_proofs: Vec<ProofAttachment>,
    pub cod_collection: Option<CodCollection>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Moves to `to` and appends exactly one timeline entry.
    pub fn advance(
        &mut self,
        to: OrderStatus,
        reason: ReasonCode,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if !self.status.can_transition_to(to) {
            return Err(AppError::InvalidState(format!(
                "order {} cannot move from {:?} to {:?}",
                self.id, self.status, to
            )));
        }

        // Clock skew must not reorder the timeline.
        let at = match self.timeline.last() {
            Some(last) if last.at > now => last.at,
            _ => now,
        };

        self.timeline.push(TimelineEntry {
            status: to,
            reason,
            note,
            at,
        });
        self.status = to;
        self.updated_at = at;
        Ok(())
    }

    pub fn assign_rider(&mut self, rider_id: Uuid) -> Result<(), AppError> {
        self.ensure_assignable()?;
        if let Some(current) = self.assigned_rider {
            return Err(AppError::InvalidState(format!(
                "order {} already assigned to rider {current}",
                self.id
            )));
        }
        self.assigned_rider = Some(rider_id);
        Ok(())
    }

    pub fn clear_rider(&mut self) -> Result<Option<Uuid>, AppError> {
        self.ensure_assignable()?;
        Ok(self.assigned_rider.take())
    }

    pub fn assign_pharmacy(&mut self, pharmacy_id: Uuid) -> Result<(), AppError> {
        self.ensure_assignable()?;
        if let Some(current) = self.assigned_pharmacy {
            return Err(AppError::InvalidState(format!(
                "order {} already assigned to pharmacy {current}",
                self.id
            )));
        }
        self.assigned_pharmacy = Some(pharmacy_id);
        Ok(())
    }

    pub fn clear_pharmacy(&mut self) -> Result<Option<Uuid>, AppError> {
        self.ensure_assignable()?;
        Ok(self.assigned_pharmacy.take())
    }

    fn ensure_assignable(&self) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "order {} is {:?}; assignments are frozen",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn ensure_status(&self, expected: OrderStatus) -> Result<(), AppError> {
        if self.status != expected {
            return Err(AppError::InvalidState(format!(
                "order {} is {:?}, expected {:?}",
                self.id, self.status, expected
            )));
        }
        Ok(())
    }

    pub fn ensure_assigned_rider(&self, rider_id: Uuid) -> Result<(), AppError> {
        if self.assigned_rider != Some(rider_id) {
            return Err(AppError::Forbidden(format!(
                "order {} is not assigned to rider {rider_id}",
                self.id
            )));
        }
        Ok(())
    }

    pub fn ensure_assigned_pharmacy(&self, pharmacy_id: Uuid) -> Result<(), AppError> {
        if self.assigned_pharmacy != Some(pharmacy_id) {
            return Err(AppError::Forbidden(format!(
                "order {} is not assigned to pharmacy {pharmacy_id}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Order as served over HTTP, carrying the legacy status labels.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub display_status: &'static str,
    pub rider_status: &'static str,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        let labels = order.status.legacy_labels();
        Self {
            order,
            display_status: labels.status,
            rider_status: labels.rider_status,
        }
    }
}

/// Result of a lifecycle operation: new status plus the entries it appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub version: u64,
    pub timeline: Vec<TimelineEntry>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            items: Vec::new(),
            delivery_address: DeliveryAddress::default(),
            delivery_location: GeoPoint { lat: 0.0, lng: 0.0 },
            payment_method: PaymentMethod::Online,
            payment_status: PaymentStatus::Pending,
            charges: OrderCharges::default(),
            coupon_code: None,
            is_prescription_order: false,
            is_reordered: false,
            plan: None,
            notes: String::new(),
            status,
            assigned_rider: None,
            assigned_pharmacy: None,
            rejected_riders: BTreeSet::new(),
            rejected_pharmacies: BTreeSet::new(),
            timeline: Vec::new(),
            pickup_proofs: Vec::new(),
            delivery_proofs: Vec::new(),
            cod_collection: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn happy_path_is_a_chain_of_legal_transitions() {
        use OrderStatus::*;
        let path = [
            Placed,
            PendingVendorResponse,
            VendorAccepted,
            RiderAssignmentPending,
            RiderAssigned,
            RiderAccepted,
            PickedUp,
            Delivered,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        use OrderStatus::*;
        for terminal in [Delivered, Rejected, Cancelled, Failed, Refunded] {
            assert!(terminal.is_terminal());
            for next in [PendingVendorResponse, RiderAssigned, Cancelled, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn picked_up_order_cannot_be_cancelled() {
        assert!(!OrderStatus::PickedUp.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::PickedUp.can_transition_to(OrderStatus::Failed));
    }

    #[test]
    fn advance_appends_one_entry_and_rejects_illegal_moves() {
        let mut order = order(OrderStatus::Placed);
        order
            .advance(
                OrderStatus::PendingVendorResponse,
                ReasonCode::VendorSelected,
                None,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(order.timeline.len(), 1);

        let err = order
            .advance(OrderStatus::PickedUp, ReasonCode::PickedUp, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(order.timeline.len(), 1);
        assert_eq!(order.status, OrderStatus::PendingVendorResponse);
    }

    #[test]
    fn timeline_timestamps_never_go_backwards() {
        let mut order = order(OrderStatus::Placed);
        let now = Utc::now();
        order
            .advance(OrderStatus::PendingVendorResponse, ReasonCode::VendorSelected, None, now)
            .unwrap();
        order
            .advance(
                OrderStatus::VendorAccepted,
                ReasonCode::VendorAccepted,
                None,
                now - Duration::seconds(5),
            )
            .unwrap();
        assert!(order.timeline[1].at >= order.timeline[0].at);
    }

    #[test]
    fn second_rider_cannot_be_assigned_without_clearing() {
        let mut order = order(OrderStatus::RiderAssignmentPending);
        order.assign_rider(Uuid::from_u128(1)).unwrap();
        assert!(order.assign_rider(Uuid::from_u128(2)).is_err());

        assert_eq!(order.clear_rider().unwrap(), Some(Uuid::from_u128(1)));
        order.assign_rider(Uuid::from_u128(2)).unwrap();
    }

    #[test]
    fn terminal_order_freezes_assignments() {
        let mut order = order(OrderStatus::Cancelled);
        assert!(order.assign_pharmacy(Uuid::new_v4()).is_err());
        assert!(order.clear_rider().is_err());
    }

    #[test]
    fn legacy_labels_keep_rider_status_consistent() {
        assert_eq!(OrderStatus::RiderAssigned.legacy_labels().rider_status, "Assigned");
        assert_eq!(OrderStatus::Delivered.legacy_labels().rider_status, "Completed");
        assert_eq!(OrderStatus::PickedUp.legacy_labels().status, "PickedUp");
    }
}
