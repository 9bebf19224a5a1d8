//! Characteristic payload decoding.
//!
//! Turns raw characteristic values into the human-readable strings carried by
//! [`DriverEvent::DataAvailable`](crate::events::DriverEvent::DataAvailable) and
//! [`DriverEvent::DataWritten`](crate::events::DriverEvent::DataWritten).

use tracing::{debug, trace};

use crate::ble::transport::CharacteristicId;
use crate::ble::uuids::{HEART_RATE_MEASUREMENT_UUID, LSM330_TEMP_SAMPLE_UUID};

/// Format flag bit selecting a 16-bit heart rate value.
pub const HEART_RATE_FORMAT_UINT16: u8 = 0x01;

/// Byte offset of the heart rate value inside the measurement payload.
const HEART_RATE_VALUE_OFFSET: usize = 1;

/// Decode a characteristic value.
///
/// `format_flags` are the property bits the peripheral declared for the
/// characteristic. Returns `None` when the payload carries no value.
///
/// # Example
///
/// ```
/// use mysming_ble::ble::uuids::HEART_RATE_MEASUREMENT;
/// use mysming_ble::protocol::decode;
///
/// assert_eq!(decode(&HEART_RATE_MEASUREMENT, &[0x00, 0x4B], 0), Some("75".to_string()));
/// ```
pub fn decode(id: &CharacteristicId, raw: &[u8], format_flags: u8) -> Option<String> {
    if id.characteristic == HEART_RATE_MEASUREMENT_UUID {
        decode_heart_rate(raw, format_flags)
    } else if id.characteristic == LSM330_TEMP_SAMPLE_UUID {
        decode_temperature(raw)
    } else {
        hex_dump(raw)
    }
}

fn decode_heart_rate(raw: &[u8], format_flags: u8) -> Option<String> {
    let value = if format_flags & HEART_RATE_FORMAT_UINT16 != 0 {
        trace!("Heart rate format UINT16");
        let bytes = raw.get(HEART_RATE_VALUE_OFFSET..HEART_RATE_VALUE_OFFSET + 2)?;
        u16::from_le_bytes([bytes[0], bytes[1]])
    } else {
        trace!("Heart rate format UINT8");
        u16::from(*raw.get(HEART_RATE_VALUE_OFFSET)?)
    };

    debug!("Received heart rate: {}", value);
    Some(value.to_string())
}

fn decode_temperature(raw: &[u8]) -> Option<String> {
    raw.first().map(|&byte| (byte as i8).to_string())
}

/// Lossy text of the payload followed by each byte as two hex digits and a space.
fn hex_dump(raw: &[u8]) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    let text = String::from_utf8_lossy(raw).into_owned();
    Some(raw.iter().fold(text, |mut out, byte| {
        out.push_str(&format!("{:02X} ", byte));
        out
    }))
}
