use crate::device::imei::DeviceId;
use crate::device::reading::Reading;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// A reading together with the moment the session decoded it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturedReading {
    pub reading: Reading,
    /// Unix time in nanoseconds.
    pub captured_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub imei: String,
    pub status: DeviceStatus,
}

impl StatusReport {
    pub fn new(imei: &DeviceId, status: DeviceStatus) -> Self {
        Self {
            imei: imei.to_string(),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingReport {
    #[serde(flatten)]
    pub device: StatusReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<Reading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

impl ReadingReport {
    pub fn offline(imei: &DeviceId) -> Self {
        Self {
            device: StatusReport::new(imei, DeviceStatus::Offline),
            reading: None,
            time: None,
        }
    }

    pub fn online(imei: &DeviceId, latest: Option<CapturedReading>) -> Self {
        Self {
            device: StatusReport::new(imei, DeviceStatus::Online),
            reading: latest.map(|c| c.reading),
            time: latest.map(|c| c.captured_at),
        }
    }
}
