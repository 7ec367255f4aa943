use crate::device::imei::DeviceId;
use crate::device::report::CapturedReading;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Destination for accepted readings, one line each. Kept apart from the
/// operational tracing log.
pub trait ReadingSink: Send + Sync {
    fn record(&self, line: &str);
}

/// `{captureTimeNanos},{imei},{temp},{alt},{lat},{lon},{battery}`
pub fn format_reading_line(imei: &DeviceId, captured: &CapturedReading) -> String {
    let r = &captured.reading;
    format!(
        "{},{},{:.6},{:.6},{:.6},{:.6},{:.6}",
        captured.captured_at, imei, r.temperature, r.altitude, r.latitude, r.longitude, r.battery
    )
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ReadingSink for StdoutSink {
    fn record(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{line}") {
            tracing::warn!(error = %e, "failed to write reading line");
        }
    }
}

/// Keeps lines in memory for tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReadingSink for MemorySink {
    fn record(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}
