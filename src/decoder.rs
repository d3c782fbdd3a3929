//! Decoder for the beacon telemetry payload.
//!
//! The advertisement payload starts with a 6-byte prefix:
//!
//! | Bytes | Field                                   |
//! |-------|-----------------------------------------|
//! | 0-1   | ADC reading in millivolts, big-endian   |
//! | 2-3   | raw temperature word, big-endian        |
//! | 4-5   | reserved, ignored                       |
//!
//! The ADC measures the cell through a 178k/150k voltage divider, so the
//! reading is scaled by 328/150 to get the cell voltage. The temperature word
//! maps linearly onto -45..130 °C.

use thiserror::Error;

/// Minimum number of payload bytes needed to decode a reading.
pub const MIN_PAYLOAD_LEN: usize = 4;

/// Upper resistor of the voltage divider, in kilo-ohms.
const DIVIDER_HIGH_KOHM: f64 = 178.0;
/// Lower resistor of the voltage divider, in kilo-ohms.
const DIVIDER_LOW_KOHM: f64 = 150.0;

const TEMPERATURE_MIN_C: f64 = -45.0;
const TEMPERATURE_SPAN_C: f64 = 175.0;
const TEMPERATURE_FULL_SCALE: f64 = 65535.0;

/// Error types for decoding beacon payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer than [`MIN_PAYLOAD_LEN`] bytes were advertised.
    #[error("Malformed payload: {len} bytes, need at least {MIN_PAYLOAD_LEN}")]
    MalformedPayload { len: usize },
}

/// Physical values carried by one advertisement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Cell voltage in Volts
    pub voltage: f64,
    /// Temperature in Celsius
    pub temperature_c: f64,
}

impl Reading {
    /// Voltage with three decimals and unit, e.g. `3.814 V`.
    pub fn formatted_voltage(&self) -> String {
        format_voltage(self.voltage)
    }

    /// Temperature with two decimals and unit, e.g. `25.62°C`.
    pub fn formatted_temperature(&self) -> String {
        format_temperature(self.temperature_c)
    }
}

/// Decode the leading bytes of an advertisement payload.
///
/// Bytes past index 3 are tolerated and ignored.
///
/// # Errors
/// Returns [`DecodeError::MalformedPayload`] if `payload` holds fewer than
/// four bytes.
pub fn decode(payload: &[u8]) -> Result<Reading, DecodeError> {
    let [adc_hi, adc_lo, temp_hi, temp_lo, ..] = *payload else {
        return Err(DecodeError::MalformedPayload { len: payload.len() });
    };

    Ok(Reading {
        voltage: adc_to_voltage(u16::from_be_bytes([adc_hi, adc_lo])),
        temperature_c: word_to_celsius(u16::from_be_bytes([temp_hi, temp_lo])),
    })
}

/// Convert the ADC millivolt reading to the cell voltage behind the divider.
#[inline]
pub fn adc_to_voltage(adc_raw: u16) -> f64 {
    f64::from(adc_raw) / 1000.0 * (DIVIDER_HIGH_KOHM + DIVIDER_LOW_KOHM) / DIVIDER_LOW_KOHM
}

/// Map the 16-bit temperature word onto -45..130 °C.
#[inline]
pub fn word_to_celsius(temp_raw: u16) -> f64 {
    TEMPERATURE_MIN_C + TEMPERATURE_SPAN_C * f64::from(temp_raw) / TEMPERATURE_FULL_SCALE
}

pub fn format_voltage(volts: f64) -> String {
    format!("{volts:.3} V")
}

pub fn format_temperature(celsius: f64) -> String {
    format!("{celsius:.2}°C")
}
