pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod server;
pub mod simulator;
pub mod sink;

// Re-export commonly used items
pub use config::Config;
pub use device::{DeviceId, Reading, Registry};
pub use error::{AppError, Result, SessionError};
pub use server::{Server, ServerConfig};
pub use sink::{MemorySink, ReadingSink, StdoutSink};
