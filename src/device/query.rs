//! Live query bridge.
//!
//! An external caller reaches a running session through the endpoint stored in
//! the registry. Each query carries its own oneshot reply slot; the session
//! fills it from its own copy of the latest reading, so the reading itself is
//! never shared. Dropping the session's inbox closes every pending slot, which
//! callers observe as the device going offline.

use crate::device::imei::DeviceId;
use crate::device::registry::Registry;
use crate::device::report::{CapturedReading, ReadingReport};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Single pending query per device; further callers wait for the slot.
const INBOX_CAPACITY: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("device session closed before answering")]
    Closed,

    #[error("device did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug)]
pub struct Query {
    respond_to: oneshot::Sender<Option<CapturedReading>>,
}

impl Query {
    /// Answer and consume the query. A caller that already gave up is ignored.
    pub fn answer(self, latest: Option<CapturedReading>) {
        let _ = self.respond_to.send(latest);
    }
}

/// Caller side, stored in the registry entry.
#[derive(Debug, Clone)]
pub struct QueryEndpoint {
    tx: mpsc::Sender<Query>,
}

/// Session side, owned exclusively by the session task.
#[derive(Debug)]
pub struct QueryInbox {
    rx: mpsc::Receiver<Query>,
}

pub fn channel() -> (QueryEndpoint, QueryInbox) {
    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
    (QueryEndpoint { tx }, QueryInbox { rx })
}

impl QueryEndpoint {
    /// Ask the session for its latest reading. `Ok(None)` means the device is
    /// online but has not sent a valid reading yet.
    pub async fn ask(&self, timeout: Duration) -> Result<Option<CapturedReading>, QueryError> {
        let exchange = async {
            let (respond_to, reply) = oneshot::channel();
            self.tx
                .send(Query { respond_to })
                .await
                .map_err(|_| QueryError::Closed)?;
            reply.await.map_err(|_| QueryError::Closed)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| QueryError::Timeout(timeout))?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl QueryInbox {
    /// Non-blocking: answer at most one pending query.
    pub fn try_serve(&mut self, latest: Option<CapturedReading>) -> bool {
        match self.rx.try_recv() {
            Ok(query) => {
                query.answer(latest);
                true
            }
            Err(_) => false,
        }
    }

    /// Wait for the next query. Cancel safe, so it can race a socket read.
    pub async fn recv(&mut self) -> Option<Query> {
        self.rx.recv().await
    }
}

/// Resolve a reading query for `imei` against the registry.
///
/// A device that stays registered but misses the caller timeout is still
/// reported online, just without a reading.
pub async fn query_reading(registry: &Registry, imei: &DeviceId, timeout: Duration) -> ReadingReport {
    let Some(endpoint) = registry.lookup(imei) else {
        debug!(imei = %imei, "reading query for unregistered device");
        return ReadingReport::offline(imei);
    };

    match endpoint.ask(timeout).await {
        Ok(latest) => ReadingReport::online(imei, latest),
        Err(QueryError::Closed) => {
            debug!(imei = %imei, "device session closed while answering query");
            ReadingReport::offline(imei)
        }
        Err(e @ QueryError::Timeout(_)) => {
            if registry.lookup(imei).is_some() {
                warn!(imei = %imei, error = %e, "live query unanswered; reporting status only");
                ReadingReport::online(imei, None)
            } else {
                ReadingReport::offline(imei)
            }
        }
    }
}
