pub mod imei;
pub mod query;
pub mod reading;
pub mod registry;
pub mod report;
pub mod session;

pub use imei::{DeviceId, ImeiError, IMEI_LENGTH};
pub use query::{query_reading, QueryEndpoint, QueryError, QueryInbox};
pub use reading::{FrameLengthError, Reading, READING_LENGTH};
pub use registry::{Registration, Registry};
pub use report::{CapturedReading, DeviceStatus, ReadingReport, StatusReport};
pub use session::{Session, SessionConfig, SessionState};
