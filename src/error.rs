//! Error types for the mysming-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No BLE adapter could be obtained (hardware absent or disabled).
    #[error("Bluetooth adapter not available")]
    AdapterUnavailable,

    /// The operation needs an adapter or a connection that does not exist yet.
    #[error("Driver not initialized or no connection")]
    NotInitialized,

    /// The address does not resolve to a known device.
    #[error("Device not found: {address}")]
    DeviceNotFound {
        /// The address that was looked up.
        address: String,
    },

    /// The transport refused an operation synchronously.
    #[error("Operation rejected: {operation}")]
    OperationRejected {
        /// Description of the refused operation.
        operation: String,
    },

    /// A stop was requested while no measurement run is active.
    #[error("No measurement is running")]
    NotMeasuring,

    /// A start was requested while a measurement run is still active.
    #[error("Measurement already in progress")]
    MeasurementInProgress,

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },
}

impl Error {
    /// Shorthand for [`Error::OperationRejected`].
    pub(crate) fn rejected(operation: impl Into<String>) -> Self {
        Self::OperationRejected {
            operation: operation.into(),
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DeviceNotFound {
            address: "C0:FF:EE:00:00:01".to_string(),
        };
        assert_eq!(err.to_string(), "Device not found: C0:FF:EE:00:00:01");
        assert_eq!(
            Error::rejected("enable notifications").to_string(),
            "Operation rejected: enable notifications"
        );
    }
}
