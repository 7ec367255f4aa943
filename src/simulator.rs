//! Device traffic generator: logs in and streams one reading per period.

use crate::device::{DeviceId, Reading};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub server_addr: String,
    pub imei: DeviceId,
    /// Delay between reading frames.
    pub period: Duration,
    pub reading: Reading,
}

pub struct DeviceSimulator {
    config: SimulatorConfig,
    stop: CancellationToken,
    tasks: TaskTracker,
    frames_sent: Arc<AtomicUsize>,
    errors_tx: mpsc::Sender<std::io::Error>,
    errors_rx: mpsc::Receiver<std::io::Error>,
}

impl DeviceSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(1);
        Self {
            config,
            stop: CancellationToken::new(),
            tasks: TaskTracker::new(),
            frames_sent: Arc::new(AtomicUsize::new(0)),
            errors_tx,
            errors_rx,
        }
    }

    pub fn start(&self) {
        let config = self.config.clone();
        let stop = self.stop.clone();
        let sent = self.frames_sent.clone();
        let errors_tx = self.errors_tx.clone();

        self.tasks.spawn(async move {
            if let Err(e) = run(config, stop, sent).await {
                warn!(error = %e, "simulated device failed");
                let _ = errors_tx.try_send(e);
            }
        });
        self.tasks.close();
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub async fn wait(&self) {
        self.tasks.wait().await;
    }

    /// The error that ended the device, if any.
    pub fn error(&mut self) -> Option<std::io::Error> {
        self.errors_rx.try_recv().ok()
    }

    pub fn frames_sent(&self) -> usize {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

async fn run(
    config: SimulatorConfig,
    stop: CancellationToken,
    sent: Arc<AtomicUsize>,
) -> std::io::Result<()> {
    let mut conn = TcpStream::connect(&config.server_addr).await?;
    info!(
        local = %conn.local_addr()?,
        server = %config.server_addr,
        imei = %config.imei,
        "simulated device connected"
    );

    conn.write_all(&config.imei.digits()).await?;
    let frame = config.reading.encode();
    let mut ticker = tokio::time::interval(config.period);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                conn.write_all(&frame).await?;
                let total = sent.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(imei = %config.imei, total, "reading frame sent");
            }
        }
    }

    conn.shutdown().await?;
    Ok(())
}
