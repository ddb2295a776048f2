use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::retry::RetryTable;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::coupon::Coupon;
use crate::models::order::{Order, TransitionOutcome};
use crate::models::pharmacy::Pharmacy;
use crate::models::rider::Rider;
use crate::models::user::User;
use crate::models::withdrawal::WithdrawalRequest;
use crate::notify::NotificationInbox;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: Config,
    pub users: DashMap<Uuid, User>,
    pub riders: DashMap<Uuid, Rider>,
    pub pharmacies: DashMap<Uuid, Pharmacy>,
    pub orders: DashMap<Uuid, Order>,
    pub coupons: DashMap<String, Coupon>,
    pub withdrawals: DashMap<Uuid, WithdrawalRequest>,
    pub assignments: DashMap<Uuid, Assignment>,
    pub notifications: NotificationInbox,
    pub retries: RetryTable,
    pub order_events_tx: broadcast::Sender<TransitionOutcome>,
    pub metrics: Metrics,
    base_fare: RwLock<Decimal>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (order_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size.max(1));
        let metrics = Metrics::new();
        let base_fare = RwLock::new(config.pricing.default_base_fare);

        Self {
            config,
            users: DashMap::new(),
            riders: DashMap::new(),
            pharmacies: DashMap::new(),
            orders: DashMap::new(),
            coupons: DashMap::new(),
            withdrawals: DashMap::new(),
            assignments: DashMap::new(),
            notifications: NotificationInbox::new(),
            retries: RetryTable::new(metrics.pending_retries.clone()),
            order_events_tx,
            metrics,
            base_fare,
        }
    }

    /// Base fare for riders without their own override.
    pub fn platform_base_fare(&self) -> Decimal {
        *self.base_fare.read()
    }

    pub fn set_platform_base_fare(&self, base_fare: Decimal) {
        *self.base_fare.write() = base_fare;
    }

    pub fn load_order(&self, order_id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
    }

    /// Stores `next` only if the stored version is still `expected_version`.
    /// The committed copy carries `expected_version + 1`.
    pub fn commit_order(&self, expected_version: u64, mut next: Order) -> Result<Order, AppError> {
        let mut slot = self
            .orders
            .get_mut(&next.id)
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", next.id)))?;

        if slot.version != expected_version {
            return Err(AppError::ConcurrentModification(next.id));
        }

        next.version = expected_version + 1;
        *slot = next.clone();
        Ok(next)
    }

    pub fn load_rider(&self, rider_id: Uuid) -> Result<Rider, AppError> {
        self.riders
            .get(&rider_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))
    }

    pub fn load_pharmacy(&self, pharmacy_id: Uuid) -> Result<Pharmacy, AppError> {
        self.pharmacies
            .get(&pharmacy_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("pharmacy {pharmacy_id} not found")))
    }

    pub fn load_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.users
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))
    }
}
