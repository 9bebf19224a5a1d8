//! In-memory transport that records every operation and answers like a
//! well-behaved peripheral.

use async_trait::async_trait;
use btleplug::api::CharPropFlags;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::ble::transport::{
    BleAdapter, BleBackend, CharacteristicId, GattCharacteristic, GattConnection, GattEvent,
    GattEventSender, GattService, GattStatus,
};
use crate::ble::uuids::*;
use crate::error::{Error, Result};

/// Install a test log subscriber once. Honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Operation seen by the fake transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Connect(String),
    Reconnect,
    DiscoverServices,
    Disconnect,
    Close,
    Read(CharacteristicId),
    Write(CharacteristicId, Vec<u8>),
    SetNotification(CharacteristicId, bool),
    WriteDescriptor(CharacteristicId, Uuid, Vec<u8>),
}

/// Shared operation log.
pub type OpLog = Arc<Mutex<Vec<Op>>>;

/// The full MySming attribute table.
pub fn mysming_services() -> Vec<GattService> {
    let characteristic = |id, properties, descriptors: Vec<Uuid>| GattCharacteristic {
        id,
        properties,
        descriptors,
    };
    let writable = |id| characteristic(id, CharPropFlags::READ | CharPropFlags::WRITE, vec![]);

    vec![
        GattService {
            uuid: HEART_RATE_SERVICE_UUID,
            characteristics: vec![characteristic(
                HEART_RATE_MEASUREMENT,
                CharPropFlags::NOTIFY,
                vec![CLIENT_CHARACTERISTIC_CONFIG_UUID],
            )],
        },
        GattService {
            uuid: LSM330_SERVICE_UUID,
            characteristics: vec![
                writable(LSM330_ACC_EN),
                writable(LSM330_GYRO_EN),
                characteristic(LSM330_TEMP_SAMPLE, CharPropFlags::READ, vec![]),
            ],
        },
        GattService {
            uuid: MEASURE_SERVICE_UUID,
            characteristics: vec![
                writable(MEASURE_START),
                writable(MEASURE_STOP),
                characteristic(
                    MEASURE_DATASTREAM,
                    CharPropFlags::NOTIFY,
                    vec![CLIENT_CHARACTERISTIC_CONFIG_UUID],
                ),
            ],
        },
    ]
}

/// Backend handing out a [`FakeAdapter`].
pub struct FakeBackend {
    pub ops: OpLog,
    pub known_addresses: Vec<String>,
    pub read_values: HashMap<CharacteristicId, Vec<u8>>,
}

impl FakeBackend {
    pub fn new(known_addresses: &[&str]) -> Self {
        Self {
            ops: Arc::default(),
            known_addresses: known_addresses.iter().map(|a| a.to_string()).collect(),
            read_values: HashMap::from([(LSM330_TEMP_SAMPLE, vec![0x19])]),
        }
    }
}

#[async_trait]
impl BleBackend for FakeBackend {
    async fn acquire_adapter(&self, events: GattEventSender) -> Result<Arc<dyn BleAdapter>> {
        Ok(Arc::new(FakeAdapter {
            ops: self.ops.clone(),
            known_addresses: self.known_addresses.clone(),
            read_values: self.read_values.clone(),
            events,
        }))
    }
}

/// Adapter resolving only the configured addresses.
pub struct FakeAdapter {
    ops: OpLog,
    known_addresses: Vec<String>,
    read_values: HashMap<CharacteristicId, Vec<u8>>,
    events: GattEventSender,
}

#[async_trait]
impl BleAdapter for FakeAdapter {
    async fn connect_gatt(
        &self,
        address: &str,
        _auto_reconnect: bool,
    ) -> Result<Arc<dyn GattConnection>> {
        if !self.known_addresses.iter().any(|a| a == address) {
            return Err(Error::DeviceNotFound {
                address: address.to_string(),
            });
        }

        self.ops.lock().push(Op::Connect(address.to_string()));
        let gatt = FakeGatt {
            ops: self.ops.clone(),
            read_values: self.read_values.clone(),
            events: self.events.clone(),
        };
        gatt.emit(GattEvent::ConnectionStateChanged {
            connected: true,
            status: GattStatus::Success,
        });
        Ok(Arc::new(gatt))
    }
}

/// Connection answering every request with a successful completion event.
pub struct FakeGatt {
    ops: OpLog,
    read_values: HashMap<CharacteristicId, Vec<u8>>,
    events: GattEventSender,
}

impl FakeGatt {
    fn emit(&self, event: GattEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl GattConnection for FakeGatt {
    async fn reconnect(&self) -> Result<()> {
        self.ops.lock().push(Op::Reconnect);
        self.emit(GattEvent::ConnectionStateChanged {
            connected: true,
            status: GattStatus::Success,
        });
        Ok(())
    }

    async fn discover_services(&self) -> Result<()> {
        self.ops.lock().push(Op::DiscoverServices);
        self.emit(GattEvent::ServicesDiscovered {
            status: GattStatus::Success,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.ops.lock().push(Op::Disconnect);
        self.emit(GattEvent::ConnectionStateChanged {
            connected: false,
            status: GattStatus::Success,
        });
        Ok(())
    }

    async fn close(&self) {
        self.ops.lock().push(Op::Close);
    }

    fn services(&self) -> Vec<GattService> {
        mysming_services()
    }

    async fn read_characteristic(&self, id: CharacteristicId) -> Result<()> {
        self.ops.lock().push(Op::Read(id));
        self.emit(GattEvent::CharacteristicRead {
            characteristic: id,
            status: GattStatus::Success,
            value: self.read_values.get(&id).cloned().unwrap_or_default(),
        });
        Ok(())
    }

    async fn write_characteristic(&self, id: CharacteristicId, value: Vec<u8>) -> Result<()> {
        self.ops.lock().push(Op::Write(id, value.clone()));
        self.emit(GattEvent::CharacteristicWrite {
            characteristic: id,
            status: GattStatus::Success,
            value,
        });
        Ok(())
    }

    async fn set_notification(&self, id: CharacteristicId, enabled: bool) -> Result<()> {
        self.ops.lock().push(Op::SetNotification(id, enabled));
        Ok(())
    }

    async fn write_descriptor(
        &self,
        id: CharacteristicId,
        descriptor: Uuid,
        value: Vec<u8>,
    ) -> Result<()> {
        self.ops
            .lock()
            .push(Op::WriteDescriptor(id, descriptor, value));
        Ok(())
    }
}
