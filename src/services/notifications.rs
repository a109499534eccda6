// src/services/notifications.rs
use std::collections::HashMap;
use std::sync::Mutex;

use log::info;

use crate::models::NotificationRequest;

/// Receiver of notification requests. Delivery and deduplication are up to
/// the implementation.
pub trait Notifier: Send + Sync {
    fn notify(&self, request: NotificationRequest);
}

/// Keeps every request in memory, grouped by user.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<HashMap<String, Vec<NotificationRequest>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(&self, user_id: &str) -> Vec<NotificationRequest> {
        match self.sent.lock() {
            Ok(sent) => sent.get(user_id).cloned().unwrap_or_default(),
            Err(poisoned) => poisoned.into_inner().get(user_id).cloned().unwrap_or_default(),
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, request: NotificationRequest) {
        info!("Notification for {}: {} - {}", request.user_id, request.title, request.message);
        let mut sent = match self.sent.lock() {
            Ok(sent) => sent,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.entry(request.user_id.clone()).or_default().push(request);
    }
}
