//! btleplug-backed transport.
//!
//! Adapts the async btleplug API to the fire-and-forget transport contract:
//! each request is spawned onto the tokio runtime and its outcome is sent back
//! as a [`GattEvent`].

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::ble::transport::{
    BleAdapter, BleBackend, CharacteristicId, GattCharacteristic, GattConnection, GattEvent,
    GattEventSender, GattService, GattStatus,
};
use crate::error::{Error, Result};

/// Generic failure status reported for btleplug errors, which carry no ATT code.
const GATT_ERROR: u8 = 0x85;

fn status_of<T>(result: &btleplug::Result<T>) -> GattStatus {
    match result {
        Ok(_) => GattStatus::Success,
        Err(_) => GattStatus::Failure(GATT_ERROR),
    }
}

/// Backend using the first adapter of the platform Bluetooth stack.
#[derive(Debug, Default)]
pub struct BtleplugBackend;

impl BtleplugBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BleBackend for BtleplugBackend {
    async fn acquire_adapter(&self, events: GattEventSender) -> Result<Arc<dyn BleAdapter>> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::AdapterUnavailable)?;

        let adapter = manager
            .adapters()
            .await
            .map_err(Error::Bluetooth)?
            .into_iter()
            .next()
            .ok_or(Error::AdapterUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Arc::new(PlatformAdapter::new(adapter, events).await?))
    }
}

/// A btleplug adapter plus the watcher translating link-loss events.
pub struct PlatformAdapter {
    adapter: Adapter,
    events: GattEventSender,
    /// Peripheral of the most recent connection.
    current: Arc<RwLock<Option<PeripheralId>>>,
    watcher: JoinHandle<()>,
}

impl PlatformAdapter {
    async fn new(adapter: Adapter, events: GattEventSender) -> Result<Self> {
        let mut central_events = adapter.events().await.map_err(Error::Bluetooth)?;
        let current: Arc<RwLock<Option<PeripheralId>>> = Arc::new(RwLock::new(None));

        let watched = current.clone();
        let tx = events.clone();
        let watcher = tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if watched.read().as_ref() == Some(&id) {
                        debug!("Peripheral {:?} disconnected", id);
                        let _ = tx.send(GattEvent::ConnectionStateChanged {
                            connected: false,
                            status: GattStatus::Success,
                        });
                    }
                }
            }
            debug!("Adapter event stream ended");
        });

        Ok(Self {
            adapter,
            events,
            current,
            watcher,
        })
    }

    /// Find a known peripheral by address (or platform identifier).
    async fn find(&self, address: &str) -> Result<Peripheral> {
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;

        peripherals
            .into_iter()
            .find(|p| {
                p.address().to_string().eq_ignore_ascii_case(address)
                    || format!("{:?}", p.id()) == address
            })
            .ok_or_else(|| {
                warn!("Device not found. Unable to connect.");
                Error::DeviceNotFound {
                    address: address.to_string(),
                }
            })
    }
}

impl Drop for PlatformAdapter {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

#[async_trait]
impl BleAdapter for PlatformAdapter {
    async fn connect_gatt(
        &self,
        address: &str,
        auto_reconnect: bool,
    ) -> Result<Arc<dyn GattConnection>> {
        let peripheral = self.find(address).await?;
        trace!("Opening connection to {} (auto_reconnect={})", address, auto_reconnect);

        *self.current.write() = Some(peripheral.id());

        let gatt = Arc::new(PlatformGatt {
            peripheral,
            events: self.events.clone(),
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        gatt.spawn_connect();

        Ok(gatt)
    }
}

/// A GATT connection to one btleplug peripheral.
pub struct PlatformGatt {
    peripheral: Peripheral,
    events: GattEventSender,
    /// Notification forwarding task.
    listener: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl PlatformGatt {
    fn emit(events: &GattEventSender, event: GattEvent) {
        if events.send(event).is_err() {
            trace!("GATT event dropped, driver gone");
        }
    }

    fn spawn_connect(&self) {
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        let listener = self.spawn_listener();
        if let Some(old) = self.listener.lock().replace(listener) {
            old.abort();
        }

        tokio::spawn(async move {
            let result = peripheral.connect().await;
            if let Err(e) = &result {
                warn!("Connection failed: {}", e);
            }
            Self::emit(
                &events,
                GattEvent::ConnectionStateChanged {
                    connected: result.is_ok(),
                    status: status_of(&result),
                },
            );
        });
    }

    /// Forward notifications as [`GattEvent::CharacteristicChanged`].
    fn spawn_listener(&self) -> JoinHandle<()> {
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to get notifications stream: {}", e);
                    return;
                }
            };

            while let Some(notification) = notifications.next().await {
                trace!(
                    "Notification from {}: {:02X?}",
                    notification.uuid,
                    notification.value
                );

                let Some(service) = peripheral
                    .characteristics()
                    .iter()
                    .find(|c| c.uuid == notification.uuid)
                    .map(|c| c.service_uuid)
                else {
                    debug!("Notification from unknown characteristic {}", notification.uuid);
                    continue;
                };

                Self::emit(
                    &events,
                    GattEvent::CharacteristicChanged {
                        characteristic: CharacteristicId::new(service, notification.uuid),
                        value: notification.value,
                    },
                );
            }

            debug!("Notification listener stopped");
        })
    }

    fn find_characteristic(&self, id: &CharacteristicId) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == id.service && c.uuid == id.characteristic)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: id.characteristic.to_string(),
            })
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::rejected(format!("{} on closed connection", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl GattConnection for PlatformGatt {
    async fn reconnect(&self) -> Result<()> {
        self.ensure_open("reconnect")?;
        self.spawn_connect();
        Ok(())
    }

    async fn discover_services(&self) -> Result<()> {
        self.ensure_open("discover services")?;
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = peripheral.discover_services().await;
            if let Err(e) = &result {
                warn!("Failed to discover services: {}", e);
            }
            Self::emit(
                &events,
                GattEvent::ServicesDiscovered {
                    status: status_of(&result),
                },
            );
        });

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.ensure_open("disconnect")?;
        let peripheral = self.peripheral.clone();

        tokio::spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                error!("Failed to disconnect: {}", e);
            }
        });

        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.abort();
        }

        if self.peripheral.is_connected().await.unwrap_or(false) {
            if let Err(e) = self.peripheral.disconnect().await {
                debug!("Disconnect on close failed: {}", e);
            }
        }
    }

    fn services(&self) -> Vec<GattService> {
        self.peripheral
            .services()
            .into_iter()
            .map(|service| GattService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| GattCharacteristic {
                        id: CharacteristicId::new(c.service_uuid, c.uuid),
                        properties: c.properties,
                        descriptors: c.descriptors.into_iter().map(|d| d.uuid).collect(),
                    })
                    .collect(),
            })
            .collect()
    }

    async fn read_characteristic(&self, id: CharacteristicId) -> Result<()> {
        self.ensure_open("read")?;
        let characteristic = self.find_characteristic(&id)?;
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = peripheral.read(&characteristic).await;
            let status = status_of(&result);
            let value = result.unwrap_or_else(|e| {
                warn!("Read of {} failed: {}", id, e);
                Vec::new()
            });
            Self::emit(
                &events,
                GattEvent::CharacteristicRead {
                    characteristic: id,
                    status,
                    value,
                },
            );
        });

        Ok(())
    }

    async fn write_characteristic(&self, id: CharacteristicId, value: Vec<u8>) -> Result<()> {
        self.ensure_open("write")?;
        let characteristic = self.find_characteristic(&id)?;
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = peripheral
                .write(&characteristic, &value, WriteType::WithResponse)
                .await;
            if let Err(e) = &result {
                warn!("Write of {} failed: {}", id, e);
            }
            Self::emit(
                &events,
                GattEvent::CharacteristicWrite {
                    characteristic: id,
                    status: status_of(&result),
                    value,
                },
            );
        });

        Ok(())
    }

    async fn set_notification(&self, id: CharacteristicId, enabled: bool) -> Result<()> {
        self.ensure_open("set notification")?;
        let characteristic = self.find_characteristic(&id)?;

        if enabled {
            self.peripheral.subscribe(&characteristic).await?;
        } else {
            self.peripheral.unsubscribe(&characteristic).await?;
        }

        debug!("Notifications for {} set to {}", id, enabled);
        Ok(())
    }

    async fn write_descriptor(
        &self,
        id: CharacteristicId,
        descriptor: Uuid,
        value: Vec<u8>,
    ) -> Result<()> {
        self.ensure_open("write descriptor")?;
        let characteristic = self.find_characteristic(&id)?;
        let Some(descriptor) = characteristic
            .descriptors
            .iter()
            .find(|d| d.uuid == descriptor)
            .cloned()
        else {
            return Err(Error::CharacteristicNotFound {
                uuid: descriptor.to_string(),
            });
        };
        let peripheral = self.peripheral.clone();

        tokio::spawn(async move {
            if let Err(e) = peripheral.write_descriptor(&descriptor, &value).await {
                warn!("Descriptor write for {} failed: {}", id, e);
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_of() {
        let ok: btleplug::Result<()> = Ok(());
        let err: btleplug::Result<()> = Err(btleplug::Error::NotConnected);
        assert_eq!(status_of(&ok), GattStatus::Success);
        assert_eq!(status_of(&err), GattStatus::Failure(GATT_ERROR));
    }

    #[test]
    fn test_backend_default() {
        let _ = BtleplugBackend::default();
        let _ = BtleplugBackend::new();
    }
}
