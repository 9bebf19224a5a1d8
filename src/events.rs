//! Domain events published to consumers of the driver.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

use crate::ble::transport::CharacteristicId;

/// Event delivered to consumers of the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// The GATT link is up, or a measurement teardown finished.
    Connected,
    /// The GATT link is down.
    Disconnected,
    /// Service discovery succeeded; the catalog is available.
    ServicesDiscovered,
    /// The measurement reached steady-state sampling.
    MeasuringStarted,
    /// The measurement begin sequence started.
    MeasurementInitializing,
    /// A characteristic value was read or pushed by the peripheral.
    DataAvailable {
        /// Source characteristic.
        characteristic: CharacteristicId,
        /// Decoded value, if the payload carried one.
        value: Option<String>,
    },
    /// A characteristic write was acknowledged.
    DataWritten {
        /// Written characteristic.
        characteristic: CharacteristicId,
        /// Decoded value that was written.
        value: Option<String>,
    },
}

/// Callback handle for unregistering callbacks.
///
/// The callback is unregistered when the handle is dropped.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Fan-out of [`DriverEvent`]s to any number of subscribers.
pub struct EventBus {
    tx: broadcast::Sender<DriverEvent>,
    callback_counter: AtomicU64,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            callback_counter: AtomicU64::new(0),
        }
    }

    /// Publish an event. Events published with no subscriber are dropped.
    pub fn publish(&self, event: DriverEvent) {
        trace!("Publishing {:?}", event);
        let _ = self.tx.send(event);
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        self.tx.subscribe()
    }

    /// Register a callback invoked for each event.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(DriverEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!("Event callback lagged by {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use parking_lot::Mutex;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(DriverEvent::Connected);
    }

    #[tokio::test]
    async fn test_subscribe_receives_in_order() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        bus.publish(DriverEvent::Connected);
        bus.publish(DriverEvent::ServicesDiscovered);

        assert_eq!(rx.recv().await.unwrap(), DriverEvent::Connected);
        assert_eq!(rx.recv().await.unwrap(), DriverEvent::ServicesDiscovered);
    }

    #[tokio::test]
    async fn test_on_event_callback() {
        let bus = EventBus::new(4);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let handle = bus.on_event(move |event| sink.lock().push(event));
        assert_eq!(handle.id(), 0);

        // Give the listener task a chance to subscribe-loop
        tokio::task::yield_now().await;
        bus.publish(DriverEvent::Disconnected);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(*seen.lock(), vec![DriverEvent::Disconnected]);
        handle.unregister();
    }
}
