//! BLE Service and Characteristic UUIDs.
//!
//! Contains the attribute table of the MySming peripheral: the standard
//! heart-rate profile plus the custom LSM330 sensor and measurement services.

use uuid::Uuid;

use crate::ble::transport::CharacteristicId;

// Heart Rate Service (Standard BLE)
/// Standard BLE Heart Rate Service UUID.
pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180d_0000_1000_8000_00805f9b34fb);
/// Heart Rate Measurement characteristic UUID (Notify).
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_00805f9b34fb);

/// Client Characteristic Configuration descriptor UUID.
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

/// Descriptor value enabling notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
/// Descriptor value disabling notifications.
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

// LSM330 Sensor Service (MySming Custom)
/// LSM330 accelerometer/gyroscope service UUID.
pub const LSM330_SERVICE_UUID: Uuid = Uuid::from_u128(0x4d53_0100_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Accelerometer enable characteristic UUID (Write, 1 byte).
pub const LSM330_ACC_EN_UUID: Uuid = Uuid::from_u128(0x4d53_0101_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Gyroscope enable characteristic UUID (Write, 1 byte).
pub const LSM330_GYRO_EN_UUID: Uuid = Uuid::from_u128(0x4d53_0102_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Temperature sample characteristic UUID (Read, signed byte).
pub const LSM330_TEMP_SAMPLE_UUID: Uuid = Uuid::from_u128(0x4d53_0103_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Accelerometer full-scale register UUID.
pub const LSM330_ACC_FSCALE_UUID: Uuid = Uuid::from_u128(0x4d53_0104_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Gyroscope full-scale register UUID.
pub const LSM330_GYRO_FSCALE_UUID: Uuid = Uuid::from_u128(0x4d53_0105_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Accelerometer output data rate register UUID.
pub const LSM330_ACC_ODR_UUID: Uuid = Uuid::from_u128(0x4d53_0106_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Gyroscope output data rate register UUID.
pub const LSM330_GYRO_ODR_UUID: Uuid = Uuid::from_u128(0x4d53_0107_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Trigger threshold value UUID.
pub const LSM330_TRIGGER_VAL_UUID: Uuid = Uuid::from_u128(0x4d53_0108_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Trigger axis selection UUID.
pub const LSM330_TRIGGER_AXIS_UUID: Uuid =
    Uuid::from_u128(0x4d53_0109_7a61_4b1c_9f0e_3c2a1d5e6b70);

// Measurement Service (MySming Custom)
/// Measurement control service UUID.
pub const MEASURE_SERVICE_UUID: Uuid = Uuid::from_u128(0x4d53_0200_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Measurement start characteristic UUID (Write, 1 byte).
pub const MEASURE_START_UUID: Uuid = Uuid::from_u128(0x4d53_0201_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Measurement stop characteristic UUID (Write, 1 byte).
pub const MEASURE_STOP_UUID: Uuid = Uuid::from_u128(0x4d53_0202_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Measurement duration characteristic UUID.
pub const MEASURE_DURATION_UUID: Uuid = Uuid::from_u128(0x4d53_0203_7a61_4b1c_9f0e_3c2a1d5e6b70);
/// Measurement data stream characteristic UUID (Notify).
pub const MEASURE_DATASTREAM_UUID: Uuid =
    Uuid::from_u128(0x4d53_0204_7a61_4b1c_9f0e_3c2a1d5e6b70);

/// Heart rate measurement.
pub const HEART_RATE_MEASUREMENT: CharacteristicId =
    CharacteristicId::new(HEART_RATE_SERVICE_UUID, HEART_RATE_MEASUREMENT_UUID);
/// Accelerometer enable.
pub const LSM330_ACC_EN: CharacteristicId =
    CharacteristicId::new(LSM330_SERVICE_UUID, LSM330_ACC_EN_UUID);
/// Gyroscope enable.
pub const LSM330_GYRO_EN: CharacteristicId =
    CharacteristicId::new(LSM330_SERVICE_UUID, LSM330_GYRO_EN_UUID);
/// Temperature sample.
pub const LSM330_TEMP_SAMPLE: CharacteristicId =
    CharacteristicId::new(LSM330_SERVICE_UUID, LSM330_TEMP_SAMPLE_UUID);
/// Accelerometer full scale.
pub const LSM330_ACC_FSCALE: CharacteristicId =
    CharacteristicId::new(LSM330_SERVICE_UUID, LSM330_ACC_FSCALE_UUID);
/// Gyroscope full scale.
pub const LSM330_GYRO_FSCALE: CharacteristicId =
    CharacteristicId::new(LSM330_SERVICE_UUID, LSM330_GYRO_FSCALE_UUID);
/// Accelerometer output data rate.
pub const LSM330_ACC_ODR: CharacteristicId =
    CharacteristicId::new(LSM330_SERVICE_UUID, LSM330_ACC_ODR_UUID);
/// Gyroscope output data rate.
pub const LSM330_GYRO_ODR: CharacteristicId =
    CharacteristicId::new(LSM330_SERVICE_UUID, LSM330_GYRO_ODR_UUID);
/// Trigger threshold.
pub const LSM330_TRIGGER_VAL: CharacteristicId =
    CharacteristicId::new(LSM330_SERVICE_UUID, LSM330_TRIGGER_VAL_UUID);
/// Trigger axis.
pub const LSM330_TRIGGER_AXIS: CharacteristicId =
    CharacteristicId::new(LSM330_SERVICE_UUID, LSM330_TRIGGER_AXIS_UUID);
/// Measurement start.
pub const MEASURE_START: CharacteristicId =
    CharacteristicId::new(MEASURE_SERVICE_UUID, MEASURE_START_UUID);
/// Measurement stop.
pub const MEASURE_STOP: CharacteristicId =
    CharacteristicId::new(MEASURE_SERVICE_UUID, MEASURE_STOP_UUID);
/// Measurement duration.
pub const MEASURE_DURATION: CharacteristicId =
    CharacteristicId::new(MEASURE_SERVICE_UUID, MEASURE_DURATION_UUID);
/// Measurement data stream.
pub const MEASURE_DATASTREAM: CharacteristicId =
    CharacteristicId::new(MEASURE_SERVICE_UUID, MEASURE_DATASTREAM_UUID);

/// Check if a service UUID belongs to the MySming custom profile.
pub fn is_mysming_service(uuid: &Uuid) -> bool {
    *uuid == LSM330_SERVICE_UUID || *uuid == MEASURE_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        let heart_rate = HEART_RATE_MEASUREMENT_UUID.to_string();
        assert!(heart_rate.contains("2a37"));

        let cccd = CLIENT_CHARACTERISTIC_CONFIG_UUID.to_string();
        assert!(cccd.contains("2902"));
    }

    #[test]
    fn test_is_mysming_service() {
        assert!(is_mysming_service(&LSM330_SERVICE_UUID));
        assert!(is_mysming_service(&MEASURE_SERVICE_UUID));
        assert!(!is_mysming_service(&HEART_RATE_SERVICE_UUID));
    }

    #[test]
    fn test_characteristic_ids_are_distinct() {
        let ids = [
            LSM330_ACC_EN,
            LSM330_GYRO_EN,
            LSM330_TEMP_SAMPLE,
            LSM330_ACC_FSCALE,
            LSM330_GYRO_FSCALE,
            LSM330_ACC_ODR,
            LSM330_GYRO_ODR,
            LSM330_TRIGGER_VAL,
            LSM330_TRIGGER_AXIS,
            MEASURE_START,
            MEASURE_STOP,
            MEASURE_DURATION,
            MEASURE_DATASTREAM,
        ];
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids
            .iter()
            .all(|id| is_mysming_service(&id.service)));
    }
}
