use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of digits in a device identifier, check digit included.
pub const IMEI_LENGTH: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImeiError {
    #[error("imei wrong length: expected {IMEI_LENGTH} digits, got {0}")]
    WrongLength(usize),

    #[error("imei should be decimal number (0-9), got {value} at position {position}")]
    NotDecimal { position: usize, value: u8 },

    #[error("imei wrong check: expected {expected}, got {actual}")]
    Checksum { expected: u8, actual: u8 },
}

/// Validated 15-digit device identifier, stored as its ASCII rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Validate a login frame of raw digit values (0-9, not ASCII).
    pub fn from_digits(raw: &[u8]) -> Result<Self, ImeiError> {
        if raw.len() != IMEI_LENGTH {
            return Err(ImeiError::WrongLength(raw.len()));
        }
        if let Some((position, &value)) = raw.iter().enumerate().find(|(_, d)| **d > 9) {
            return Err(ImeiError::NotDecimal { position, value });
        }

        let expected = check_digit(&raw[..IMEI_LENGTH - 1]);
        let actual = raw[IMEI_LENGTH - 1];
        if expected != actual {
            return Err(ImeiError::Checksum { expected, actual });
        }

        Ok(Self(raw.iter().map(|d| char::from(b'0' + d)).collect()))
    }

    /// Raw digit values, the form a device puts on the wire.
    pub fn digits(&self) -> [u8; IMEI_LENGTH] {
        let mut out = [0u8; IMEI_LENGTH];
        for (slot, b) in out.iter_mut().zip(self.0.bytes()) {
            *slot = b - b'0';
        }
        out
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Luhn check digit over the leading 14 digits: every odd-indexed digit is
/// doubled and folded back below 10 before summing.
pub fn check_digit(body: &[u8]) -> u8 {
    let sum: u32 = body
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            let d = u32::from(d);
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

impl FromStr for DeviceId {
    type Err = ImeiError;

    /// Parse the ASCII form used in request paths.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != IMEI_LENGTH {
            return Err(ImeiError::WrongLength(s.len()));
        }
        if let Some((position, &value)) = s
            .as_bytes()
            .iter()
            .enumerate()
            .find(|(_, b)| !b.is_ascii_digit())
        {
            return Err(ImeiError::NotDecimal { position, value });
        }
        let digits: Vec<u8> = s.bytes().map(|b| b - b'0').collect();
        Self::from_digits(&digits)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
