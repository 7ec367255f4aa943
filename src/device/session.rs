//! Per-connection protocol state machine.
//!
//! `Connecting -> LoggingIn -> Active -> Closed`. Every exit path, errors and
//! shutdown included, goes through [`Session::close`], which closes the
//! connection and releases the registry slot. The slot is also released by
//! `Drop` if the task unwinds.

use crate::device::imei::{DeviceId, IMEI_LENGTH};
use crate::device::query::{self, Query, QueryInbox};
use crate::device::reading::{Reading, READING_LENGTH};
use crate::device::registry::{Registration, Registry};
use crate::device::report::CapturedReading;
use crate::error::SessionError;
use crate::sink::{format_reading_line, ReadingSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub login_deadline: Duration,
    pub message_deadline: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    LoggingIn,
    Active,
    Closed,
}

/// State that exists only once the device is logged in.
struct ActiveDevice {
    registration: Registration,
    inbox: QueryInbox,
    latest: Option<CapturedReading>,
}

pub struct Session<S> {
    id: Uuid,
    peer: String,
    stream: S,
    config: SessionConfig,
    registry: Registry,
    sink: Arc<dyn ReadingSink>,
    shutdown: CancellationToken,
    state: SessionState,
    device: Option<ActiveDevice>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        config: SessionConfig,
        registry: Registry,
        sink: Arc<dyn ReadingSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer: peer.into(),
            stream,
            config,
            registry,
            sink,
            shutdown,
            state: SessionState::Connecting,
            device: None,
        }
    }

    /// Run the session to completion. A server-initiated shutdown is `Ok`.
    pub async fn run(mut self) -> Result<(), SessionError> {
        info!(session = %self.id, peer = %self.peer, "device connecting");

        let result = self.drive().await;
        self.close().await;

        match &result {
            Ok(()) => info!(session = %self.id, peer = %self.peer, "session closed by shutdown"),
            Err(SessionError::Disconnected) => {
                info!(session = %self.id, peer = %self.peer, "device disconnected")
            }
            Err(e) => warn!(session = %self.id, peer = %self.peer, error = %e, "session closed"),
        }
        result
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::LoggingIn);

        let mut login = [0u8; IMEI_LENGTH];
        if !self
            .read_frame(&mut login, self.config.login_deadline, SessionError::LoginTimeout)
            .await?
        {
            return Ok(());
        }
        let imei = DeviceId::from_digits(&login)?;

        let (endpoint, inbox) = query::channel();
        let registration = Registration::acquire(&self.registry, imei.clone(), endpoint)
            .ok_or_else(|| SessionError::Duplicate(imei.clone()))?;
        self.device = Some(ActiveDevice {
            registration,
            inbox,
            latest: None,
        });
        info!(session = %self.id, peer = %self.peer, imei = %imei, "device logged in");
        self.transition(SessionState::Active);

        loop {
            let mut frame = [0u8; READING_LENGTH];
            if !self
                .read_frame(&mut frame, self.config.message_deadline, SessionError::MessageTimeout)
                .await?
            {
                return Ok(());
            }
            let captured_at = now_nanos();
            let reading = Reading::decode(&frame)?;
            self.process(reading, captured_at);

            if let Some(device) = self.device.as_mut() {
                if device.inbox.try_serve(device.latest) {
                    debug!(session = %self.id, "answered live query after frame");
                }
            }
        }
    }

    fn process(&mut self, reading: Reading, captured_at: i64) {
        let Some(device) = self.device.as_mut() else {
            return;
        };
        let imei = device.registration.imei();

        if !reading.is_valid() {
            warn!(session = %self.id, imei = %imei, reading = ?reading, "rejected out-of-range reading");
            return;
        }

        let captured = CapturedReading {
            reading,
            captured_at,
        };
        debug!(session = %self.id, imei = %imei, reading = ?reading, "reading accepted");
        self.sink.record(&format_reading_line(imei, &captured));
        device.latest = Some(captured);
    }

    /// Fill `buf` before the deadline. Live queries that arrive meanwhile are
    /// answered without extending the deadline. `Ok(false)` means shutdown.
    async fn read_frame(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
        on_timeout: fn(Duration) -> SessionError,
    ) -> Result<bool, SessionError> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(false),
                _ = sleep_until(deadline) => return Err(on_timeout(timeout)),
                read = self.stream.read(&mut buf[filled..]) => match read? {
                    0 if filled == 0 => return Err(SessionError::Disconnected),
                    0 => {
                        return Err(SessionError::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!("connection closed after {filled} of {} bytes", buf.len()),
                        )))
                    }
                    n => filled += n,
                },
                Some(query) = next_query(self.device.as_mut()) => self.answer(query),
            }
        }
        Ok(true)
    }

    fn answer(&self, query: Query) {
        let latest = self.device.as_ref().and_then(|d| d.latest);
        debug!(session = %self.id, has_reading = latest.is_some(), "answered live query");
        query.answer(latest);
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(session = %self.id, error = %e, "connection close error");
        }
        if let Some(device) = self.device.take() {
            debug!(session = %self.id, imei = %device.registration.imei(), "device unregistered");
        }
        self.transition(SessionState::Closed);
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, from = ?self.state, to = ?next, "session state");
        self.state = next;
    }
}

async fn next_query(device: Option<&mut ActiveDevice>) -> Option<Query> {
    match device {
        Some(device) => device.inbox.recv().await,
        None => std::future::pending().await,
    }
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
