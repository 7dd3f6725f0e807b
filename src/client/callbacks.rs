//! Page-registered callbacks for acknowledged events.

use crate::collector::EventAck;
use std::sync::{Arc, RwLock};

/// Callback invoked with the collector's view of each recorded event.
pub type EventCallback = Arc<dyn Fn(&EventAck) + Send + Sync>;

/// Callbacks the host page registered with the sensor.
///
/// Shared between the sensor and whoever embeds it; dispatch with nothing
/// registered is a no-op.
#[derive(Default)]
pub struct CallbackRegistry {
    on_event: RwLock<Option<EventCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the `onEvent` callback, replacing any earlier one.
    pub fn set_on_event<F>(&self, callback: F)
    where
        F: Fn(&EventAck) + Send + Sync + 'static,
    {
        *self.on_event.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(callback));
    }

    pub fn clear(&self) {
        *self.on_event.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Hand an acknowledgment to the registered callback.
    ///
    /// Returns whether a callback ran.
    pub fn dispatch(&self, ack: &EventAck) -> bool {
        let callback = self
            .on_event
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match callback {
            Some(callback) => {
                callback(ack);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered = self
            .on_event
            .read()
            .map(|c| c.is_some())
            .unwrap_or(false);
        f.debug_struct("CallbackRegistry")
            .field("on_event", &registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_without_callback() {
        let registry = CallbackRegistry::new();
        assert!(!registry.dispatch(&EventAck::default()));
    }

    #[test]
    fn test_dispatch_calls_registered_callback() {
        let registry = CallbackRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        registry.set_on_event(move |ack| {
            assert_eq!(ack.visit_id, "v1");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let ack = EventAck {
            visit_id: "v1".to_string(),
            ..Default::default()
        };
        assert!(registry.dispatch(&ack));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.clear();
        assert!(!registry.dispatch(&ack));
    }
}
