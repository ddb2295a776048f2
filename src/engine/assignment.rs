use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::selector::{Candidate, Selection, select_nearest};
use crate::error::AppError;
use crate::geo::{GeoPoint, haversine_km};
use crate::models::assignment::{Assignment, AssignmentTarget};
use crate::models::order::{Order, OrderStatus, ReasonCode};
use crate::pricing;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiderPick {
    pub rider_id: Uuid,
    pub distance_km: f64,
    pub delivery_charge: Decimal,
}

/// Online, license-approved riders with spare capacity.
pub fn list_eligible_riders(state: &AppState) -> Vec<Candidate> {
    state
        .riders
        .iter()
        .filter_map(|entry| {
            let rider = entry.value();
            if rider.is_dispatchable() {
                Some(Candidate {
                    id: rider.id,
                    location: rider.location,
                    spare_capacity: Some(rider.capacity.saturating_sub(rider.active_orders)),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Active pharmacies; Pending/Suspended/Inactive never take orders.
pub fn list_eligible_pharmacies(state: &AppState) -> Vec<Candidate> {
    state
        .pharmacies
        .iter()
        .filter(|entry| entry.value().accepts_orders())
        .map(|entry| Candidate {
            id: entry.value().id,
            location: entry.value().location,
            spare_capacity: None,
        })
        .collect()
}

pub fn pharmacy_location(state: &AppState, order: &Order) -> Option<GeoPoint> {
    order
        .assigned_pharmacy
        .and_then(|id| state.pharmacies.get(&id).and_then(|pharmacy| pharmacy.location))
}

/// Picks the nearest eligible rider to the pickup point, prices the delivery
/// leg and moves the order to `RiderAssigned`. `Ok(None)` leaves the order
/// untouched.
pub fn assign_nearest_rider(
    state: &AppState,
    order: &mut Order,
    now: DateTime<Utc>,
) -> Result<Option<RiderPick>, AppError> {
    let start = Instant::now();

    let pickup = pharmacy_location(state, order);
    let target = pickup.unwrap_or(order.delivery_location);
    let candidates = list_eligible_riders(state);
    let selection = select_nearest(&target, &candidates, &order.rejected_riders)?;

    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[AssignmentTarget::Rider.as_str()])
        .observe(start.elapsed().as_secs_f64());

    let Some(selection) = selection else {
        state
            .metrics
            .assignment_attempts_total
            .with_label_values(&[AssignmentTarget::Rider.as_str(), "no_candidate"])
            .inc();
        warn!(
            order_id = %order.id,
            candidates = candidates.len(),
            excluded = order.rejected_riders.len(),
            "no eligible rider"
        );
        return Ok(None);
    };

    let rider = state.load_rider(selection.id)?;
    // Rider -> pharmacy is not billed; the customer pays for pharmacy -> door.
    let leg_km = match pickup {
        Some(pharmacy) => haversine_km(&pharmacy, &order.delivery_location)?,
        None => selection.distance_km,
    };
    let delivery_charge = pricing::delivery_charge(
        leg_km,
        state.config.pricing.rate_per_km,
        rider.effective_base_fare(state.platform_base_fare()),
    )?;

    order.assign_rider(rider.id)?;
    order.charges = pricing::with_delivery_charge(&order.charges, delivery_charge);
    order.advance(
        OrderStatus::RiderAssigned,
        ReasonCode::RiderAssigned,
        Some(format!(
            "rider {} assigned, {:.2} km from pickup",
            rider.name, selection.distance_km
        )),
        now,
    )?;

    state
        .metrics
        .assignment_attempts_total
        .with_label_values(&[AssignmentTarget::Rider.as_str(), "assigned"])
        .inc();

    Ok(Some(RiderPick {
        rider_id: rider.id,
        distance_km: selection.distance_km,
        delivery_charge,
    }))
}

/// Picks the nearest Active pharmacy to the drop-off that has not rejected
/// the order and moves it to `PendingVendorResponse`.
pub fn assign_nearest_pharmacy(
    state: &AppState,
    order: &mut Order,
    reason: ReasonCode,
    now: DateTime<Utc>,
) -> Result<Option<Selection>, AppError> {
    let start = Instant::now();

    let candidates = list_eligible_pharmacies(state);
    let selection = select_nearest(
        &order.delivery_location,
        &candidates,
        &order.rejected_pharmacies,
    )?;

    state
        .metrics
        .assignment_latency_seconds
        .with_label_values(&[AssignmentTarget::Pharmacy.as_str()])
        .observe(start.elapsed().as_secs_f64());

    let Some(selection) = selection else {
        state
            .metrics
            .assignment_attempts_total
            .with_label_values(&[AssignmentTarget::Pharmacy.as_str(), "no_candidate"])
            .inc();
        warn!(
            order_id = %order.id,
            excluded = order.rejected_pharmacies.len(),
            "no eligible pharmacy"
        );
        return Ok(None);
    };

    order.assign_pharmacy(selection.id)?;
    order.advance(
        OrderStatus::PendingVendorResponse,
        reason,
        Some(format!(
            "pharmacy {} selected, {:.2} km from drop-off",
            selection.id, selection.distance_km
        )),
        now,
    )?;

    state
        .metrics
        .assignment_attempts_total
        .with_label_values(&[AssignmentTarget::Pharmacy.as_str(), "assigned"])
        .inc();

    Ok(Some(selection))
}

/// Audit row plus rider load bookkeeping, run after the order commit.
pub fn record_assignment(
    state: &AppState,
    order_id: Uuid,
    target: AssignmentTarget,
    candidate_id: Uuid,
    distance_km: f64,
    now: DateTime<Utc>,
) -> Assignment {
    let assignment = Assignment {
        id: Uuid::new_v4(),
        order_id,
        target,
        candidate_id,
        distance_km,
        assigned_at: now,
    };
    state.assignments.insert(assignment.id, assignment.clone());

    if target == AssignmentTarget::Rider {
        adjust_rider_load(state, candidate_id, 1);
    }

    info!(
        order_id = %order_id,
        target = target.as_str(),
        candidate_id = %candidate_id,
        distance_km,
        "order assigned"
    );

    assignment
}

pub fn adjust_rider_load(state: &AppState, rider_id: Uuid, delta: i8) {
    let Some(mut rider) = state.riders.get_mut(&rider_id) else {
        warn!(rider_id = %rider_id, "rider vanished before load update");
        return;
    };

    rider.active_orders = if delta >= 0 {
        rider.active_orders.saturating_add(delta.unsigned_abs())
    } else {
        rider.active_orders.saturating_sub(delta.unsigned_abs())
    };
    rider.updated_at = Utc::now();

    state
        .metrics
        .rider_utilization
        .with_label_values(&[&rider_id.to_string()])
        .set(rider.utilization());
}
