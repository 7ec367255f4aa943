use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use thiserror::Error;

/// Size of one reading frame on the wire: five big-endian f64 fields.
pub const READING_LENGTH: usize = 40;

const FIELD_LENGTH: usize = 8;

const TEMPERATURE_RANGE: RangeInclusive<f64> = -300.0..=300.0;
const ALTITUDE_RANGE: RangeInclusive<f64> = -20_000.0..=20_000.0;
const LATITUDE_RANGE: RangeInclusive<f64> = -90.0..=90.0;
const LONGITUDE_RANGE: RangeInclusive<f64> = -180.0..=180.0;
const BATTERY_MAX: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("reading frame must be {READING_LENGTH} bytes, got {0}")]
pub struct FrameLengthError(pub usize);

/// One telemetry sample, fields in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    pub temperature: f64,
    pub altitude: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub battery: f64,
}

impl Reading {
    /// Reinterpret each 8-byte big-endian chunk as an f64 bit pattern.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameLengthError> {
        if frame.len() != READING_LENGTH {
            return Err(FrameLengthError(frame.len()));
        }

        let mut fields = frame.chunks_exact(FIELD_LENGTH).map(|chunk| {
            let mut bytes = [0u8; FIELD_LENGTH];
            bytes.copy_from_slice(chunk);
            f64::from_be_bytes(bytes)
        });
        // chunks_exact over 40 bytes always yields five fields
        let mut next = || fields.next().unwrap_or_default();

        Ok(Self {
            temperature: next(),
            altitude: next(),
            latitude: next(),
            longitude: next(),
            battery: next(),
        })
    }

    pub fn encode(&self) -> [u8; READING_LENGTH] {
        let mut frame = [0u8; READING_LENGTH];
        let fields = [
            self.temperature,
            self.altitude,
            self.latitude,
            self.longitude,
            self.battery,
        ];
        for (chunk, value) in frame.chunks_exact_mut(FIELD_LENGTH).zip(fields) {
            chunk.copy_from_slice(&value.to_be_bytes());
        }
        frame
    }

    /// Range check. Battery excludes zero, every other bound is inclusive.
    /// NaN fails every range.
    pub fn is_valid(&self) -> bool {
        TEMPERATURE_RANGE.contains(&self.temperature)
            && ALTITUDE_RANGE.contains(&self.altitude)
            && LATITUDE_RANGE.contains(&self.latitude)
            && LONGITUDE_RANGE.contains(&self.longitude)
            && self.battery > 0.0
            && self.battery <= BATTERY_MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperature: f64, battery: f64) -> Reading {
        Reading {
            temperature,
            battery,
            ..Reading::default()
        }
    }

    #[test]
    fn test_decode_known_bytes() {
        let mut frame = [0u8; READING_LENGTH];
        frame[..8].copy_from_slice(&73.73f64.to_be_bytes());
        frame[32..].copy_from_slice(&0.1f64.to_be_bytes());

        let r = Reading::decode(&frame).unwrap();
        assert_eq!(r.temperature, 73.73);
        assert_eq!(r.altitude, 0.0);
        assert_eq!(r.battery, 0.1);
    }

    #[test]
    fn test_decode_preserves_bit_patterns() {
        let r = Reading {
            temperature: -0.0,
            altitude: f64::MAX,
            latitude: f64::MIN_POSITIVE,
            longitude: -179.999_999_9,
            battery: 99.5,
        };
        let decoded = Reading::decode(&r.encode()).unwrap();
        assert_eq!(decoded.temperature.to_bits(), (-0.0f64).to_bits());
        assert_eq!(decoded, r);
    }

    #[test]
    fn test_decode_wrong_length() {
        assert_eq!(Reading::decode(&[0u8; 39]), Err(FrameLengthError(39)));
        assert_eq!(Reading::decode(&[0u8; 41]), Err(FrameLengthError(41)));
        assert_eq!(Reading::decode(&[]), Err(FrameLengthError(0)));
    }

    #[test]
    fn test_valid_messages() {
        assert!(reading(0.0, 0.1).is_valid());
        let edge = Reading {
            temperature: -300.0,
            altitude: 20_000.0,
            latitude: -90.0,
            longitude: 180.0,
            battery: 100.0,
        };
        assert!(edge.is_valid());
    }

    #[test]
    fn test_temperature_bounds() {
        assert!(reading(-300.0, 50.0).is_valid());
        assert!(reading(300.0, 50.0).is_valid());
        assert!(!reading(-300.0000001, 50.0).is_valid());
        assert!(!reading(300.0000001, 50.0).is_valid());
        assert!(!reading(301.0, 0.1).is_valid());
    }

    #[test]
    fn test_battery_bounds_are_asymmetric() {
        assert!(!reading(300.0, 0.0).is_valid());
        assert!(reading(0.0, f64::MIN_POSITIVE).is_valid());
        assert!(reading(0.0, 100.0).is_valid());
        assert!(!reading(0.0, 100.0000001).is_valid());
    }

    #[test]
    fn test_other_field_bounds() {
        let base = reading(0.0, 1.0);
        assert!(!Reading { altitude: -20_000.1, ..base }.is_valid());
        assert!(!Reading { latitude: 90.5, ..base }.is_valid());
        assert!(!Reading { longitude: -180.5, ..base }.is_valid());
        assert!(!Reading { temperature: f64::NAN, ..base }.is_valid());
    }
}
