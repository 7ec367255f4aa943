use std::time::Duration;
use telemetry_gateway::device::{DeviceId, Reading};
use telemetry_gateway::simulator::{DeviceSimulator, SimulatorConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let server_addr =
        std::env::var("SIM_SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:1337".into());
    let imei: DeviceId = std::env::var("SIM_IMEI")
        .unwrap_or_else(|_| "490154203237518".into())
        .parse()?;
    let period_ms: u64 = std::env::var("SIM_PERIOD_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(500);

    let mut sim = DeviceSimulator::new(SimulatorConfig {
        server_addr,
        imei,
        period: Duration::from_millis(period_ms),
        reading: Reading {
            temperature: 21.0,
            altitude: 120.0,
            latitude: 55.75,
            longitude: 37.62,
            battery: 87.5,
        },
    });
    sim.start();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            sim.stop();
        }
        _ = sim.wait() => {}
    }
    sim.wait().await;

    if let Some(e) = sim.error() {
        error!(error = %e, "simulated device stopped with error");
        return Err(e.into());
    }
    info!(frames = sim.frames_sent(), "simulated device stopped");
    Ok(())
}
