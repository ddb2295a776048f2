//! Order lifecycle: every state change goes through [`mutate`], which works on
//! a copy of the order and commits it with a version compare-and-swap, so two
//! writers racing on one order cannot both win. Side effects (notifications,
//! rider load, wallet credit, retry scheduling) run only after the commit.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::assignment::{
    RiderPick, adjust_rider_load, assign_nearest_pharmacy, assign_nearest_rider, pharmacy_location,
    record_assignment,
};
use crate::engine::retry::{RetryKind, ScheduledRetry, backoff_delay};
use crate::error::AppError;
use crate::geo::{GeoPoint, haversine_km, travel_minutes};
use crate::models::assignment::AssignmentTarget;
use crate::models::notification::TargetType;
use crate::models::order::{
    CodCollection, CodPaymentMode, DeliveryAddress, LineItem, Order, OrderStatus, PaymentMethod,
    PaymentStatus, ProofAttachment, ReasonCode, RecurringPlan, TimelineEntry, TransitionOutcome,
};
use crate::models::rider::Rider;
use crate::notify::NotificationSink;
use crate::pricing;
use crate::state::AppState;

/// Lost CAS races a retry job re-runs before giving up.
const RETRY_CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User(Uuid),
    Admin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrder {
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub delivery_address: DeliveryAddress,
    pub delivery_location: Option<GeoPoint>,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub is_prescription_order: bool,
    #[serde(default)]
    pub is_reordered: bool,
    pub plan: Option<RecurringPlan>,
    #[serde(default)]
    pub notes: String,
    /// Set when a pharmacy creates the order itself (prescription flow).
    pub pharmacy_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodDetails {
    pub collected_amount: Decimal,
    pub mode: CodPaymentMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RetryOutcome {
    Stale,
    Assigned { candidate_id: Uuid },
    Rescheduled { attempt: u32 },
    Terminated { status: OrderStatus },
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteEstimate {
    pub order_id: Uuid,
    pub rider_id: Uuid,
    pub pharmacy_id: Uuid,
    pub pickup_distance_km: f64,
    pub pickup_minutes: u32,
    pub drop_distance_km: f64,
    pub drop_minutes: u32,
    pub estimated_delivery_at: DateTime<Utc>,
}

struct Committed<T> {
    order: Order,
    value: T,
    delta: Vec<TimelineEntry>,
}

impl<T> Committed<T> {
    fn outcome(&self) -> TransitionOutcome {
        TransitionOutcome {
            order_id: self.order.id,
            status: self.order.status,
            version: self.order.version,
            timeline: self.delta.clone(),
        }
    }
}

fn mutate<T>(
    state: &AppState,
    order_id: Uuid,
    apply: impl FnOnce(&mut Order) -> Result<T, AppError>,
) -> Result<Committed<T>, AppError> {
    let current = state.load_order(order_id)?;
    let before = current.timeline.len();

    let mut next = current.clone();
    let value = apply(&mut next)?;

    let order = state.commit_order(current.version, next)?;
    let delta = order.timeline[before..].to_vec();
    publish(state, &order, &delta);

    Ok(Committed {
        order,
        value,
        delta,
    })
}

fn publish(state: &AppState, order: &Order, delta: &[TimelineEntry]) {
    for entry in delta {
        state
            .metrics
            .order_transitions_total
            .with_label_values(&[entry.status.as_str()])
            .inc();
        info!(
            order_id = %order.id,
            status = entry.status.as_str(),
            reason = ?entry.reason,
            version = order.version,
            "order transition"
        );
    }

    state.retries.discard_stale(order.id, order.status);

    if !delta.is_empty() {
        let _ = state.order_events_tx.send(TransitionOutcome {
            order_id: order.id,
            status: order.status,
            version: order.version,
            timeline: delta.to_vec(),
        });
    }
}

fn notify_order(
    state: &AppState,
    target: TargetType,
    target_id: Uuid,
    order: &Order,
    message: String,
) {
    state
        .notifications
        .notify(target, target_id, message, Some(order.id), Some(order.status));
}

pub fn place_order(
    state: &AppState,
    request: PlaceOrder,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    let user = state.load_user(request.user_id)?;

    let delivery_location = request.delivery_location.or(user.location).ok_or_else(|| {
        AppError::BadRequest("delivery location missing and user has no saved location".to_string())
    })?;
    delivery_location.validate()?;

    let coupon_code = request
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty());
    let coupon = match coupon_code {
        Some(code) => Some(
            state
                .coupons
                .get(code)
                .map(|coupon| coupon.value().clone())
                .ok_or_else(|| AppError::BadRequest(format!("unknown coupon {code}")))?,
        ),
        None => None,
    };

    let charges =
        pricing::price_order(&request.items, coupon.as_ref(), &state.config.pricing, now)?;

    let mut order = Order {
        id: Uuid::new_v4(),
        user_id: user.id,
        items: request.items,
        delivery_address: request.delivery_address,
        delivery_location,
        payment_method: request.payment_method,
        payment_status: PaymentStatus::initial_for(request.payment_method),
        charges,
        coupon_code: coupon.map(|coupon| coupon.code),
        is_prescription_order: request.is_prescription_order,
        is_reordered: request.is_reordered,
        plan: request.plan,
        notes: request.notes,
        status: OrderStatus::Placed,
        assigned_rider: None,
        assigned_pharmacy: None,
        rejected_riders: BTreeSet::new(),
        rejected_pharmacies: BTreeSet::new(),
        timeline: vec![TimelineEntry {
            status: OrderStatus::Placed,
            reason: ReasonCode::OrderPlaced,
            note: None,
            at: now,
        }],
        pickup_proofs: Vec::new(),
        delivery_proofs: Vec::new(),
        cod_collection: None,
        version: 0,
        created_at: now,
        updated_at: now,
    };

    let selection = match request.pharmacy_id {
        Some(pharmacy_id) => {
            let pharmacy = state.load_pharmacy(pharmacy_id)?;
            if !pharmacy.accepts_orders() {
                return Err(AppError::InvalidState(format!(
                    "pharmacy {pharmacy_id} is {:?} and cannot take orders",
                    pharmacy.status
                )));
            }
            order.assign_pharmacy(pharmacy_id)?;
            order.advance(
                OrderStatus::PendingVendorResponse,
                ReasonCode::VendorSelected,
                Some("order created by pharmacy".to_string()),
                now,
            )?;
            let distance_km = pharmacy
                .location
                .and_then(|location| haversine_km(&location, &delivery_location).ok())
                .unwrap_or(0.0);
            Some((pharmacy_id, distance_km))
        }
        None => assign_nearest_pharmacy(state, &mut order, ReasonCode::VendorSelected, now)?
            .map(|selection| (selection.id, selection.distance_km)),
    };

    if selection.is_none() {
        order.advance(
            OrderStatus::Failed,
            ReasonCode::NoVendorAvailable,
            Some("no active pharmacy can serve this address".to_string()),
            now,
        )?;
    }

    state.orders.insert(order.id, order.clone());
    publish(state, &order, &order.timeline);

    match selection {
        Some((pharmacy_id, distance_km)) => {
            record_assignment(
                state,
                order.id,
                AssignmentTarget::Pharmacy,
                pharmacy_id,
                distance_km,
                now,
            );
            notify_order(
                state,
                TargetType::Vendor,
                pharmacy_id,
                &order,
                format!("New order {} received", order.id),
            );
        }
        None => notify_order(
            state,
            TargetType::User,
            order.user_id,
            &order,
            "Sorry, no pharmacy is available to fulfil your order right now.".to_string(),
        ),
    }

    Ok(order)
}

pub fn vendor_respond(
    state: &AppState,
    order_id: Uuid,
    pharmacy_id: Uuid,
    decision: Decision,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    match decision {
        Decision::Accept => {
            let committed = mutate(state, order_id, |order| {
                order.ensure_assigned_pharmacy(pharmacy_id)?;
                order.ensure_status(OrderStatus::PendingVendorResponse)?;
                order.advance(OrderStatus::VendorAccepted, ReasonCode::VendorAccepted, None, now)?;
                order.advance(
                    OrderStatus::RiderAssignmentPending,
                    ReasonCode::RiderSearchStarted,
                    None,
                    now,
                )?;
                assign_nearest_rider(state, order, now)
            })?;

            notify_order(
                state,
                TargetType::User,
                committed.order.user_id,
                &committed.order,
                "Your order was accepted by the pharmacy.".to_string(),
            );

            match committed.value {
                Some(pick) => on_rider_assigned(state, &committed.order, pick, now),
                None => schedule_rider_retry(
                    state,
                    order_id,
                    1,
                    state.config.dispatch.rider_retry_max_attempts,
                    now,
                ),
            }

            Ok(committed.outcome())
        }
        Decision::Reject => {
            let committed = mutate(state, order_id, |order| {
                order.ensure_assigned_pharmacy(pharmacy_id)?;
                order.ensure_status(OrderStatus::PendingVendorResponse)?;
                order.rejected_pharmacies.insert(pharmacy_id);
                order.clear_pharmacy()?;
                order.advance(
                    OrderStatus::VendorReassignmentPending,
                    ReasonCode::VendorRejected,
                    Some(format!("pharmacy {pharmacy_id} rejected the order")),
                    now,
                )
            })?;

            state.retries.schedule(ScheduledRetry {
                order_id,
                kind: RetryKind::VendorReassignment,
                attempt: 1,
                max_attempts: 1,
                due_at: now + Duration::seconds(state.config.dispatch.reassign_delay_secs as i64),
                expected_status: OrderStatus::VendorReassignmentPending,
            });

            Ok(committed.outcome())
        }
    }
}

pub fn rider_respond(
    state: &AppState,
    order_id: Uuid,
    rider_id: Uuid,
    decision: Decision,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    match decision {
        Decision::Accept => {
            let committed = mutate(state, order_id, |order| {
                order.ensure_assigned_rider(rider_id)?;
                order.ensure_status(OrderStatus::RiderAssigned)?;
                order.advance(OrderStatus::RiderAccepted, ReasonCode::RiderAccepted, None, now)
            })?;

            notify_order(
                state,
                TargetType::User,
                committed.order.user_id,
                &committed.order,
                "A rider accepted your order and is heading to the pharmacy.".to_string(),
            );

            Ok(committed.outcome())
        }
        Decision::Reject => {
            let committed = mutate(state, order_id, |order| {
                order.ensure_assigned_rider(rider_id)?;
                order.ensure_status(OrderStatus::RiderAssigned)?;
                order.rejected_riders.insert(rider_id);
                order.clear_rider()?;
                order.charges = pricing::with_delivery_charge(&order.charges, Decimal::ZERO);
                order.advance(
                    OrderStatus::RiderAssignmentPending,
                    ReasonCode::RiderRejected,
                    Some(format!("rider {rider_id} rejected the order")),
                    now,
                )
            })?;

            adjust_rider_load(state, rider_id, -1);
            schedule_rider_retry(
                state,
                order_id,
                1,
                state.config.dispatch.rider_reject_retry_attempts,
                now,
            );

            Ok(committed.outcome())
        }
    }
}

fn on_rider_assigned(state: &AppState, order: &Order, pick: RiderPick, now: DateTime<Utc>) {
    record_assignment(
        state,
        order.id,
        AssignmentTarget::Rider,
        pick.rider_id,
        pick.distance_km,
        now,
    );
    notify_order(
        state,
        TargetType::Rider,
        pick.rider_id,
        order,
        format!(
            "New order {} assigned to you, delivery to {}. Earning {}.",
            order.id, order.delivery_address.city, pick.delivery_charge
        ),
    );
}

fn schedule_rider_retry(
    state: &AppState,
    order_id: Uuid,
    attempt: u32,
    max_attempts: u32,
    now: DateTime<Utc>,
) {
    state.retries.schedule(ScheduledRetry {
        order_id,
        kind: RetryKind::RiderAssignment,
        attempt,
        max_attempts: max_attempts.max(1),
        due_at: now + backoff_delay(&state.config.dispatch, attempt),
        expected_status: OrderStatus::RiderAssignmentPending,
    });
}

/// Executes one due retry job against the order's current state.
pub fn run_retry(
    state: &AppState,
    job: &ScheduledRetry,
    now: DateTime<Utc>,
) -> Result<RetryOutcome, AppError> {
    for _ in 0..RETRY_CAS_ATTEMPTS {
        let result = match job.kind {
            RetryKind::RiderAssignment => retry_rider_assignment(state, job, now),
            RetryKind::VendorReassignment => retry_vendor_assignment(state, job, now),
        };

        match result {
            Err(AppError::ConcurrentModification(order_id)) => {
                warn!(
                    order_id = %order_id,
                    kind = ?job.kind,
                    "retry lost a race; re-reading order"
                );
            }
            Err(AppError::InvalidState(_)) | Err(AppError::NotFound(_)) => {
                return Ok(RetryOutcome::Stale)
            }
            other => return other,
        }
    }

    Err(AppError::ConcurrentModification(job.order_id))
}

fn retry_rider_assignment(
    state: &AppState,
    job: &ScheduledRetry,
    now: DateTime<Utc>,
) -> Result<RetryOutcome, AppError> {
    let committed = mutate(state, job.order_id, |order| {
        order.ensure_status(job.expected_status)?;
        match assign_nearest_rider(state, order, now)? {
            Some(pick) => Ok(Some(pick)),
            None if job.is_last_attempt() => {
                order.advance(
                    OrderStatus::Cancelled,
                    ReasonCode::NoRiderAvailable,
                    Some(format!("no rider available after {} attempt(s)", job.attempt)),
                    now,
                )?;
                Ok(None)
            }
            None => Err(AppError::NoCandidateAvailable("rider")),
        }
    });

    let committed = match committed {
        Err(AppError::NoCandidateAvailable(_)) => {
            let attempt = job.attempt + 1;
            schedule_rider_retry(state, job.order_id, attempt, job.max_attempts, now);
            return Ok(RetryOutcome::Rescheduled { attempt });
        }
        other => other?,
    };

    let order = &committed.order;
    match committed.value {
        Some(pick) => {
            on_rider_assigned(state, order, pick, now);
            notify_order(
                state,
                TargetType::User,
                order.user_id,
                order,
                "A rider has been assigned to your order.".to_string(),
            );
            Ok(RetryOutcome::Assigned {
                candidate_id: pick.rider_id,
            })
        }
        None => {
            notify_order(
                state,
                TargetType::User,
                order.user_id,
                order,
                "Unfortunately, your order was cancelled because no rider was available."
                    .to_string(),
            );
            if let Some(pharmacy_id) = order.assigned_pharmacy {
                notify_order(
                    state,
                    TargetType::Vendor,
                    pharmacy_id,
                    order,
                    format!("Order {} was cancelled: no rider available.", order.id),
                );
            }
            Ok(RetryOutcome::Terminated {
                status: OrderStatus::Cancelled,
            })
        }
    }
}

fn retry_vendor_assignment(
    state: &AppState,
    job: &ScheduledRetry,
    now: DateTime<Utc>,
) -> Result<RetryOutcome, AppError> {
    let committed = mutate(state, job.order_id, |order| {
        order.ensure_status(job.expected_status)?;
        let selection = assign_nearest_pharmacy(state, order, ReasonCode::VendorReassigned, now)?;
        if selection.is_none() {
            order.advance(
                OrderStatus::Failed,
                ReasonCode::NoVendorAvailable,
                Some(format!(
                    "all {} nearby pharmacies declined or are unavailable",
                    order.rejected_pharmacies.len()
                )),
                now,
            )?;
        }
        Ok(selection)
    })?;

    let order = &committed.order;
    match committed.value {
        Some(selection) => {
            record_assignment(
                state,
                order.id,
                AssignmentTarget::Pharmacy,
                selection.id,
                selection.distance_km,
                now,
            );
            notify_order(
                state,
                TargetType::Vendor,
                selection.id,
                order,
                format!("New order {} received", order.id),
            );
            Ok(RetryOutcome::Assigned {
                candidate_id: selection.id,
            })
        }
        None => {
            notify_order(
                state,
                TargetType::User,
                order.user_id,
                order,
                "Sorry, no pharmacy could fulfil your order.".to_string(),
            );
            Ok(RetryOutcome::Terminated {
                status: OrderStatus::Failed,
            })
        }
    }
}

fn proof(
    rider_id: Uuid,
    image_url: &str,
    distance_to_pharmacy_m: Option<f64>,
    now: DateTime<Utc>,
) -> Result<ProofAttachment, AppError> {
    let image_url = image_url.trim();
    if image_url.is_empty() {
        return Err(AppError::BadRequest("image_url cannot be empty".to_string()));
    }
    Ok(ProofAttachment {
        rider_id,
        image_url: image_url.to_string(),
        uploaded_at: now,
        distance_to_pharmacy_m,
    })
}

fn distance_to_pharmacy_m(state: &AppState, order: &Order, rider: &Rider) -> Result<f64, AppError> {
    let pharmacy = pharmacy_location(state, order).ok_or_else(|| {
        AppError::BadRequest(format!("pharmacy location for order {} is unknown", order.id))
    })?;
    let rider_location = rider.location.ok_or_else(|| {
        AppError::BadRequest("rider location not available; enable location services".to_string())
    })?;
    Ok(haversine_km(&rider_location, &pharmacy)? * 1_000.0)
}

pub fn attach_pickup_proof(
    state: &AppState,
    order_id: Uuid,
    rider_id: Uuid,
    image_url: &str,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    let rider = state.load_rider(rider_id)?;

    let committed = mutate(state, order_id, |order| {
        order.ensure_assigned_rider(rider_id)?;
        order.ensure_status(OrderStatus::RiderAccepted)?;
        let distance = distance_to_pharmacy_m(state, order, &rider).ok();
        order.pickup_proofs.push(proof(rider_id, image_url, distance, now)?);
        order.updated_at = now;
        Ok(())
    })?;

    Ok(committed.order)
}

pub fn attach_delivery_proof(
    state: &AppState,
    order_id: Uuid,
    rider_id: Uuid,
    image_url: &str,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    let committed = mutate(state, order_id, |order| {
        order.ensure_assigned_rider(rider_id)?;
        order.ensure_status(OrderStatus::PickedUp)?;
        order.delivery_proofs.push(proof(rider_id, image_url, None, now)?);
        order.updated_at = now;
        Ok(())
    })?;

    Ok(committed.order)
}

pub fn mark_picked_up(
    state: &AppState,
    order_id: Uuid,
    rider_id: Uuid,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    let rider = state.load_rider(rider_id)?;
    let dispatch = &state.config.dispatch;

    let committed = mutate(state, order_id, |order| {
        order.ensure_assigned_rider(rider_id)?;
        order.ensure_status(OrderStatus::RiderAccepted)?;

        if order.pickup_proofs.is_empty() {
            return Err(AppError::InvalidState(
                "upload a pickup proof before marking the order picked up".to_string(),
            ));
        }

        if dispatch.require_pickup_proximity {
            let distance_m = distance_to_pharmacy_m(state, order, &rider)?;
            if distance_m > dispatch.pickup_proximity_m {
                return Err(AppError::Forbidden(format!(
                    "rider is {distance_m:.0} m from the pharmacy; must be within {:.0} m",
                    dispatch.pickup_proximity_m
                )));
            }
        }

        order.advance(OrderStatus::PickedUp, ReasonCode::PickedUp, None, now)
    })?;

    let order = &committed.order;
    let eta = pharmacy_location(state, order)
        .and_then(|pharmacy| haversine_km(&pharmacy, &order.delivery_location).ok())
        .and_then(|km| travel_minutes(km, dispatch.average_speed_kmh).ok());
    let message = match eta {
        Some(minutes) => format!("Your order is on the way, arriving in about {minutes} min."),
        None => "Your order is on the way.".to_string(),
    };
    notify_order(state, TargetType::User, order.user_id, order, message);

    Ok(committed.outcome())
}

pub fn mark_delivered(
    state: &AppState,
    order_id: Uuid,
    rider_id: Uuid,
    cod: Option<CodDetails>,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    state.load_rider(rider_id)?;

    let committed = mutate(state, order_id, |order| {
        order.ensure_assigned_rider(rider_id)?;
        order.ensure_status(OrderStatus::PickedUp)?;

        if order.delivery_proofs.is_empty() {
            return Err(AppError::InvalidState(
                "upload a delivery proof before marking the order delivered".to_string(),
            ));
        }

        let note = if order.payment_method == PaymentMethod::CashOnDelivery {
            let cod = cod.as_ref().ok_or_else(|| {
                AppError::BadRequest(
                    "cash-on-delivery orders need collected_amount and mode".to_string(),
                )
            })?;
            if cod.collected_amount.is_sign_negative() {
                return Err(AppError::BadRequest(format!(
                    "collected amount {} must not be negative",
                    cod.collected_amount
                )));
            }
            order.cod_collection = Some(CodCollection {
                collected_amount: cod.collected_amount,
                mode: cod.mode,
                collected_at: now,
            });
            Some(match cod.mode {
                CodPaymentMode::Cash => format!("{} collected in cash", cod.collected_amount),
                CodPaymentMode::Online => {
                    format!("{} received online at the door", cod.collected_amount)
                }
            })
        } else {
            None
        };

        order.payment_status = PaymentStatus::Completed;
        order.advance(OrderStatus::Delivered, ReasonCode::Delivered, note, now)?;
        Ok(order.charges.delivery_charge)
    })?;

    let earning = committed.value;
    let balance = {
        let mut rider = state
            .riders
            .get_mut(&rider_id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;
        rider.wallet.credit(earning, Some(order_id), "delivery earnings")?;
        rider.updated_at = now;
        rider.wallet.balance()
    };
    state
        .metrics
        .wallet_operations_total
        .with_label_values(&["credit"])
        .inc();
    adjust_rider_load(state, rider_id, -1);

    let order = &committed.order;
    info!(
        order_id = %order.id,
        rider_id = %rider_id,
        earning = %earning,
        balance = %balance,
        "rider credited"
    );

    notify_order(
        state,
        TargetType::User,
        order.user_id,
        order,
        "Your order has been delivered.".to_string(),
    );
    notify_order(
        state,
        TargetType::Rider,
        rider_id,
        order,
        format!("{earning} credited to your wallet for order {}.", order.id),
    );

    Ok(committed.outcome())
}

fn holds_rider_slot(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::RiderAssigned | OrderStatus::RiderAccepted | OrderStatus::PickedUp
    )
}

/// Shared path for every admin/user-driven terminal transition.
fn terminate(
    state: &AppState,
    order_id: Uuid,
    to: OrderStatus,
    reason: ReasonCode,
    note: Option<String>,
    now: DateTime<Utc>,
    prepare: impl FnOnce(&mut Order) -> Result<(), AppError>,
) -> Result<TransitionOutcome, AppError> {
    let committed = mutate(state, order_id, |order| {
        prepare(order)?;
        let prior = order.status;
        order.advance(to, reason, note, now)?;
        Ok(prior)
    })?;

    let order = &committed.order;
    let prior = committed.value;

    if let Some(rider_id) = order.assigned_rider.filter(|_| holds_rider_slot(prior)) {
        adjust_rider_load(state, rider_id, -1);
        notify_order(
            state,
            TargetType::Rider,
            rider_id,
            order,
            format!("Order {} is no longer active ({:?}).", order.id, to),
        );
    }
    if let Some(pharmacy_id) = order.assigned_pharmacy {
        notify_order(
            state,
            TargetType::Vendor,
            pharmacy_id,
            order,
            format!("Order {} is no longer active ({:?}).", order.id, to),
        );
    }

    Ok(committed.outcome())
}

pub fn cancel(
    state: &AppState,
    order_id: Uuid,
    actor: Actor,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    let reason_code = match actor {
        Actor::User(_) => ReasonCode::CancelledByUser,
        Actor::Admin => ReasonCode::CancelledByAdmin,
    };

    let outcome = terminate(
        state,
        order_id,
        OrderStatus::Cancelled,
        reason_code,
        Some(reason.to_string()),
        now,
        |order| match actor {
            Actor::User(user_id) if order.user_id != user_id => Err(AppError::Forbidden(format!(
                "order {} does not belong to user {user_id}",
                order.id
            ))),
            _ => Ok(()),
        },
    )?;

    if actor == Actor::Admin {
        let order = state.load_order(order_id)?;
        notify_order(
            state,
            TargetType::User,
            order.user_id,
            &order,
            format!("Your order was cancelled: {reason}"),
        );
    }

    Ok(outcome)
}

pub fn reject(
    state: &AppState,
    order_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    let outcome = terminate(
        state,
        order_id,
        OrderStatus::Rejected,
        ReasonCode::RejectedByAdmin,
        Some(reason.to_string()),
        now,
        |_| Ok(()),
    )?;

    let order = state.load_order(order_id)?;
    notify_order(
        state,
        TargetType::User,
        order.user_id,
        &order,
        format!("Your order was rejected: {reason}"),
    );

    Ok(outcome)
}

pub fn refund(
    state: &AppState,
    order_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    let outcome = terminate(
        state,
        order_id,
        OrderStatus::Refunded,
        ReasonCode::Refunded,
        Some(reason.to_string()),
        now,
        |order| {
            if order.payment_method != PaymentMethod::Online {
                return Err(AppError::InvalidState(format!(
                    "order {} was not prepaid; nothing to refund",
                    order.id
                )));
            }
            order.payment_status = PaymentStatus::Refunded;
            Ok(())
        },
    )?;

    let order = state.load_order(order_id)?;
    notify_order(
        state,
        TargetType::User,
        order.user_id,
        &order,
        format!("Your payment for order {} will be refunded.", order.id),
    );

    Ok(outcome)
}

pub fn fail_delivery(
    state: &AppState,
    order_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, AppError> {
    let outcome = terminate(
        state,
        order_id,
        OrderStatus::Failed,
        ReasonCode::DeliveryFailed,
        Some(reason.to_string()),
        now,
        |_| Ok(()),
    )?;

    let order = state.load_order(order_id)?;
    notify_order(
        state,
        TargetType::User,
        order.user_id,
        &order,
        format!("Delivery of your order failed: {reason}"),
    );

    Ok(outcome)
}

/// Hard delete. Drops any scheduled retry and frees the rider slot.
pub fn delete_order(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    let (_, order) = state
        .orders
        .remove(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    state.retries.cancel(order_id);
    if let Some(rider_id) = order.assigned_rider.filter(|_| holds_rider_slot(order.status)) {
        adjust_rider_load(state, rider_id, -1);
    }

    warn!(order_id = %order_id, status = order.status.as_str(), "order deleted");
    Ok(order)
}

pub fn route_estimate(
    state: &AppState,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<RouteEstimate, AppError> {
    let order = state.load_order(order_id)?;

    let rider_id = order
        .assigned_rider
        .ok_or_else(|| AppError::InvalidState(format!("order {order_id} has no rider assigned")))?;
    let pharmacy_id = order.assigned_pharmacy.ok_or_else(|| {
        AppError::InvalidState(format!("order {order_id} has no pharmacy assigned"))
    })?;

    let rider = state.load_rider(rider_id)?;
    let rider_location = rider
        .location
        .ok_or_else(|| AppError::BadRequest(format!("rider {rider_id} has no location")))?;
    let pharmacy_location = pharmacy_location(state, &order)
        .ok_or_else(|| AppError::BadRequest(format!("pharmacy {pharmacy_id} has no location")))?;

    let speed = state.config.dispatch.average_speed_kmh;
    let pickup_distance_km = haversine_km(&rider_location, &pharmacy_location)?;
    let drop_distance_km = haversine_km(&pharmacy_location, &order.delivery_location)?;
    let pickup_minutes = travel_minutes(pickup_distance_km, speed)?;
    let drop_minutes = travel_minutes(drop_distance_km, speed)?;

    Ok(RouteEstimate {
        order_id,
        rider_id,
        pharmacy_id,
        pickup_distance_km,
        pickup_minutes,
        drop_distance_km,
        drop_minutes,
        estimated_delivery_at: now
            + Duration::minutes(i64::from(pickup_minutes) + i64::from(drop_minutes)),
    })
}
