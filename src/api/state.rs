use crate::device::Registry;
use std::time::Duration;
use tokio_util::task::TaskTracker;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub sessions: TaskTracker,
    pub query_timeout: Duration,
}

impl AppState {
    pub fn new(registry: Registry, sessions: TaskTracker, query_timeout: Duration) -> Self {
        Self {
            registry,
            sessions,
            query_timeout,
        }
    }
}
