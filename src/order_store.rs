use std::sync::Arc;

use crate::gateway::{RemoteGateway, Transport};
use crate::models::OrderSequence;
use crate::notify::Notifier;

pub const USER_ORDER_KEY: &str = "user_order";

/// Persists the manual order under [`USER_ORDER_KEY`] as a JSON array of ids.
///
/// Neither operation fails outward: problems are reported through the
/// notifier and the in-memory order stays authoritative.
pub struct OrderStore<T> {
    gateway: Arc<RemoteGateway<T>>,
    notifier: Arc<dyn Notifier>,
}

impl<T> Clone for OrderStore<T> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<T: Transport> OrderStore<T> {
    pub fn new(gateway: Arc<RemoteGateway<T>>, notifier: Arc<dyn Notifier>) -> Self {
        Self { gateway, notifier }
    }

    /// Loads the stored order. A missing key reads as empty. `None` means the
    /// value could not be read or parsed; that has already been reported.
    pub async fn load(&self) -> Option<OrderSequence> {
        log::debug!("fetch stored order");
        let raw = match self.gateway.get_value(USER_ORDER_KEY).await {
            Ok(raw) => raw,
            Err(error) => {
                log::error!("error getting stored order: {error}");
                self.notifier
                    .error("error getting storage", &error.to_string());
                return None;
            }
        };
        let Some(raw) = raw else {
            return Some(OrderSequence::new());
        };
        match serde_json::from_str::<OrderSequence>(&raw) {
            Ok(order) => Some(order),
            Err(error) => {
                log::error!("stored order is malformed: {error} raw={raw}");
                self.notifier
                    .error("error getting storage", &error.to_string());
                None
            }
        }
    }

    /// Writes `order`. Returns whether the write went through.
    pub async fn save(&self, order: &OrderSequence) -> bool {
        let value = match serde_json::to_string(order) {
            Ok(value) => value,
            Err(error) => {
                self.notifier
                    .error("error updating storage", &error.to_string());
                return false;
            }
        };
        match self.gateway.set_value(USER_ORDER_KEY, &value).await {
            Ok(()) => {
                log::debug!("stored order {value}");
                true
            }
            Err(error) => {
                log::error!("error updating stored order: {error}");
                self.notifier
                    .error("error updating storage", &error.to_string());
                false
            }
        }
    }
}
