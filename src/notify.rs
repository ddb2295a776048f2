use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::models::notification::{Notification, TargetType};
use crate::models::order::OrderStatus;

/// Where lifecycle side effects are delivered. Delivery transport (push,
/// SMS, email) lives behind this; the lifecycle only appends records.
pub trait NotificationSink: Send + Sync {
    fn notify(
        &self,
        target_type: TargetType,
        target_id: Uuid,
        message: String,
        order_id: Option<Uuid>,
        order_status: Option<OrderStatus>,
    );
}

/// Per-recipient inboxes held in memory.
#[derive(Default)]
pub struct NotificationInbox {
    inboxes: DashMap<(TargetType, Uuid), Vec<Notification>>,
}

impl NotificationInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest first.
    pub fn list(&self, target_type: TargetType, target_id: Uuid) -> Vec<Notification> {
        let mut items = self
            .inboxes
            .get(&(target_type, target_id))
            .map(|inbox| inbox.value().clone())
            .unwrap_or_default();
        items.reverse();
        items
    }

    pub fn mark_read(&self, target_type: TargetType, target_id: Uuid) -> usize {
        let Some(mut inbox) = self.inboxes.get_mut(&(target_type, target_id)) else {
            return 0;
        };
        let mut marked = 0;
        for item in inbox.iter_mut().filter(|item| !item.read) {
            item.read = true;
            marked += 1;
        }
        marked
    }
}

impl NotificationSink for NotificationInbox {
    fn notify(
        &self,
        target_type: TargetType,
        target_id: Uuid,
        message: String,
        order_id: Option<Uuid>,
        order_status: Option<OrderStatus>,
    ) {
        debug!(
            target_type = target_type.as_str(),
            target_id = %target_id,
            order_id = ?order_id,
            "notification queued"
        );

        self.inboxes
            .entry((target_type, target_id))
            .or_default()
            .push(Notification {
                id: Uuid::new_v4(),
                target_type,
                target_id,
                message,
                order_id,
                order_status,
                read: false,
                created_at: Utc::now(),
            });
    }
}
