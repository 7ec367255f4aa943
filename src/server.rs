//! Device listener and shutdown coordination.
//!
//! Every accepted connection runs as a session task tracked by a
//! [`TaskTracker`]. `stop` cancels one shared [`CancellationToken`]: the
//! accept loop drops the listener and every session closes its connection at
//! its next suspension point. `wait` returns once the accept loop has exited
//! and the tracked session count is back to zero.

use crate::device::{Registry, Session, SessionConfig};
use crate::error::{AppError, Result};
use crate::sink::ReadingSink;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Stream of server-fatal errors, i.e. accept loop failures.
pub type ServerErrors = ReceiverStream<AppError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub login_deadline: Duration,
    pub message_deadline: Duration,
}

impl ServerConfig {
    fn session(&self) -> SessionConfig {
        SessionConfig {
            login_deadline: self.login_deadline,
            message_deadline: self.message_deadline,
        }
    }
}

pub struct Server {
    config: ServerConfig,
    registry: Registry,
    sink: Arc<dyn ReadingSink>,
    shutdown: CancellationToken,
    acceptor: TaskTracker,
    sessions: TaskTracker,
    errors_tx: mpsc::Sender<AppError>,
    errors_rx: Option<mpsc::Receiver<AppError>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(config: ServerConfig, sink: Arc<dyn ReadingSink>) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let acceptor = TaskTracker::new();
        // nothing to wait for until start() spawns the accept loop
        acceptor.close();

        Self {
            config,
            registry: Registry::new(),
            sink,
            shutdown: CancellationToken::new(),
            acceptor,
            sessions: TaskTracker::new(),
            errors_tx,
            errors_rx: Some(errors_rx),
            local_addr: None,
        }
    }

    /// Bind the listener and start accepting devices. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        info!(addr = %self.config.listen_addr, "device listener starting");
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|source| AppError::Bind {
                addr: self.config.listen_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        let acceptor = Acceptor {
            listener,
            session_config: self.config.session(),
            registry: self.registry.clone(),
            sink: self.sink.clone(),
            shutdown: self.shutdown.clone(),
            sessions: self.sessions.clone(),
            errors_tx: self.errors_tx.clone(),
        };
        self.acceptor.spawn(acceptor.run());

        info!(addr = %local_addr, "device listener ready");
        Ok(local_addr)
    }

    /// Close the listener and broadcast shutdown to every session.
    pub fn stop(&self) {
        info!("device server stopping");
        self.shutdown.cancel();
    }

    /// Block until the accept loop has exited and every session has closed.
    pub async fn wait(&self) {
        self.acceptor.wait().await;
        self.sessions.close();
        self.sessions.wait().await;
        debug!("all device sessions drained");
    }

    /// Take the fatal error stream. Only the first call gets it.
    pub fn errors(&mut self) -> Option<ServerErrors> {
        self.errors_rx.take().map(ReceiverStream::new)
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Sessions spawned and not yet closed.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Handle onto the session set, for reporting the active count elsewhere.
    pub fn session_tracker(&self) -> TaskTracker {
        self.sessions.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

struct Acceptor {
    listener: TcpListener,
    session_config: SessionConfig,
    registry: Registry,
    sink: Arc<dyn ReadingSink>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
    errors_tx: mpsc::Sender<AppError>,
}

impl Acceptor {
    async fn run(self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("device listener closed");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, active = self.sessions.len(), "connection accepted");
                        let session = Session::new(
                            stream,
                            peer.to_string(),
                            self.session_config,
                            self.registry.clone(),
                            self.sink.clone(),
                            self.shutdown.clone(),
                        );
                        self.sessions.spawn(async move {
                            // outcome is logged by the session itself
                            let _ = session.run().await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed; device listener exiting");
                        if self.errors_tx.try_send(AppError::Accept(e)).is_err() {
                            warn!("server error channel full; dropping accept error");
                        }
                        break;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn config(addr: &str) -> ServerConfig {
        ServerConfig {
            listen_addr: addr.to_string(),
            login_deadline: Duration::from_millis(50),
            message_deadline: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_port() {
        let mut server = Server::new(config("127.0.0.1:0"), Arc::new(MemorySink::new()));
        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));

        server.stop();
        server.wait().await;
        assert_eq!(server.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let mut server = Server::new(config("not-an-address"), Arc::new(MemorySink::new()));
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, AppError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_wait_without_start_returns() {
        let server = Server::new(config("127.0.0.1:0"), Arc::new(MemorySink::new()));
        server.stop();
        tokio::time::timeout(Duration::from_secs(1), server.wait())
            .await
            .expect("wait should not block when nothing was started");
    }

    #[tokio::test]
    async fn test_errors_can_be_taken_once() {
        let mut server = Server::new(config("127.0.0.1:0"), Arc::new(MemorySink::new()));
        assert!(server.errors().is_some());
        assert!(server.errors().is_none());
    }
}
