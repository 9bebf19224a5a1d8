//! GATT event dispatching.
//!
//! Maps each transport event onto at most one [`DriverEvent`]. Failed
//! discoveries, reads and writes are logged here and go no further.

use tracing::{trace, warn};

use crate::ble::catalog::ServiceCatalog;
use crate::ble::transport::{CharacteristicId, GattEvent};
use crate::events::DriverEvent;
use crate::protocol::decode;

/// Translate a transport event into the event consumers see.
///
/// `catalog` supplies the declared format flags used by the decoder.
pub fn translate(event: &GattEvent, catalog: &ServiceCatalog) -> Option<DriverEvent> {
    match event {
        GattEvent::ConnectionStateChanged { connected: true, .. } => Some(DriverEvent::Connected),
        GattEvent::ConnectionStateChanged {
            connected: false, ..
        } => Some(DriverEvent::Disconnected),
        GattEvent::ServicesDiscovered { status } => {
            if status.is_success() {
                Some(DriverEvent::ServicesDiscovered)
            } else {
                warn!("Service discovery failed: {:?}", status);
                None
            }
        }
        GattEvent::CharacteristicRead {
            characteristic,
            status,
            value,
        } => {
            if !status.is_success() {
                trace!("Read of {} failed: {:?}", characteristic, status);
                return None;
            }
            Some(DriverEvent::DataAvailable {
                characteristic: *characteristic,
                value: decode_value(characteristic, value, catalog),
            })
        }
        GattEvent::CharacteristicWrite {
            characteristic,
            status,
            value,
        } => {
            if !status.is_success() {
                trace!("Write of {} failed: {:?}", characteristic, status);
                return None;
            }
            Some(DriverEvent::DataWritten {
                characteristic: *characteristic,
                value: decode_value(characteristic, value, catalog),
            })
        }
        GattEvent::CharacteristicChanged {
            characteristic,
            value,
        } => Some(DriverEvent::DataAvailable {
            characteristic: *characteristic,
            value: decode_value(characteristic, value, catalog),
        }),
    }
}

fn decode_value(id: &CharacteristicId, value: &[u8], catalog: &ServiceCatalog) -> Option<String> {
    decode(id, value, catalog.format_flags(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::transport::{GattCharacteristic, GattService, GattStatus};
    use crate::ble::uuids::*;
    use btleplug::api::CharPropFlags;

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::from_services(vec![GattService {
            uuid: HEART_RATE_SERVICE_UUID,
            characteristics: vec![GattCharacteristic {
                id: HEART_RATE_MEASUREMENT,
                properties: CharPropFlags::BROADCAST | CharPropFlags::NOTIFY,
                descriptors: vec![CLIENT_CHARACTERISTIC_CONFIG_UUID],
            }],
        }])
    }

    #[test]
    fn test_connection_events() {
        let catalog = ServiceCatalog::default();
        assert_eq!(
            translate(
                &GattEvent::ConnectionStateChanged {
                    connected: true,
                    status: GattStatus::Success
                },
                &catalog
            ),
            Some(DriverEvent::Connected)
        );
        assert_eq!(
            translate(
                &GattEvent::ConnectionStateChanged {
                    connected: false,
                    status: GattStatus::Failure(0x08)
                },
                &catalog
            ),
            Some(DriverEvent::Disconnected)
        );
    }

    #[test]
    fn test_discovery_failure_swallowed() {
        let catalog = ServiceCatalog::default();
        assert_eq!(
            translate(
                &GattEvent::ServicesDiscovered {
                    status: GattStatus::Success
                },
                &catalog
            ),
            Some(DriverEvent::ServicesDiscovered)
        );
        assert_eq!(
            translate(
                &GattEvent::ServicesDiscovered {
                    status: GattStatus::Failure(0x81)
                },
                &catalog
            ),
            None
        );
    }

    #[test]
    fn test_read_and_write() {
        let catalog = ServiceCatalog::default();
        assert_eq!(
            translate(
                &GattEvent::CharacteristicRead {
                    characteristic: LSM330_TEMP_SAMPLE,
                    status: GattStatus::Success,
                    value: vec![0x1E],
                },
                &catalog
            ),
            Some(DriverEvent::DataAvailable {
                characteristic: LSM330_TEMP_SAMPLE,
                value: Some("30".to_string()),
            })
        );
        assert_eq!(
            translate(
                &GattEvent::CharacteristicWrite {
                    characteristic: LSM330_ACC_EN,
                    status: GattStatus::Success,
                    value: vec![0x01],
                },
                &catalog
            ),
            Some(DriverEvent::DataWritten {
                characteristic: LSM330_ACC_EN,
                value: Some("\u{1}01 ".to_string()),
            })
        );
    }

    #[test]
    fn test_failed_read_and_write_swallowed() {
        let catalog = ServiceCatalog::default();
        let read = GattEvent::CharacteristicRead {
            characteristic: LSM330_TEMP_SAMPLE,
            status: GattStatus::Failure(0x02),
            value: vec![],
        };
        let write = GattEvent::CharacteristicWrite {
            characteristic: LSM330_ACC_EN,
            status: GattStatus::Failure(0x03),
            value: vec![0x01],
        };
        assert_eq!(translate(&read, &catalog), None);
        assert_eq!(translate(&write, &catalog), None);
    }

    #[test]
    fn test_changed_uses_catalog_flags() {
        // BROADCAST is bit 0, so the heart rate is read as 16 bits
        let event = GattEvent::CharacteristicChanged {
            characteristic: HEART_RATE_MEASUREMENT,
            value: vec![0x01, 0x4B, 0x00],
        };
        assert_eq!(
            translate(&event, &catalog()),
            Some(DriverEvent::DataAvailable {
                characteristic: HEART_RATE_MEASUREMENT,
                value: Some("75".to_string()),
            })
        );
    }

    #[test]
    fn test_empty_payload_still_notifies() {
        let event = GattEvent::CharacteristicChanged {
            characteristic: MEASURE_DATASTREAM,
            value: vec![],
        };
        assert_eq!(
            translate(&event, &ServiceCatalog::default()),
            Some(DriverEvent::DataAvailable {
                characteristic: MEASURE_DATASTREAM,
                value: None,
            })
        );
    }
}
