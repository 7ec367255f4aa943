use crate::api::models::StatsResponse;
use crate::api::state::AppState;
use crate::device::{query_reading, DeviceId, ReadingReport, StatusReport};
use crate::error::Result;
use axum::{
    extract::{Path, State},
    response::Json,
};
use std::sync::Arc;

/// `GET /status/{imei}`
///
/// The path must hold a full valid imei, check digit included. A 15-digit
/// value with a wrong check digit is a 400, not an `offline` device.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(imei): Path<String>,
) -> Result<Json<StatusReport>> {
    let imei: DeviceId = imei.parse()?;
    let report = state.registry.status(&imei);
    tracing::debug!(imei = %imei, status = ?report.status, "status query");
    Ok(Json(report))
}

/// `GET /readings/{imei}`: asks the live session for its latest reading.
pub async fn get_reading(
    State(state): State<Arc<AppState>>,
    Path(imei): Path<String>,
) -> Result<Json<ReadingReport>> {
    let imei: DeviceId = imei.parse()?;
    let report = query_reading(&state.registry, &imei, state.query_timeout).await;
    tracing::debug!(
        imei = %imei,
        status = ?report.device.status,
        has_reading = report.reading.is_some(),
        "reading query"
    );
    Ok(Json(report))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        online_devices: state.registry.len(),
        active_sessions: state.sessions.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{query, CapturedReading, DeviceStatus, ImeiError, Reading};
    use crate::error::AppError;
    use std::time::Duration;
    use tokio_util::task::TaskTracker;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(
            crate::device::Registry::new(),
            TaskTracker::new(),
            Duration::from_millis(100),
        ))
    }

    #[tokio::test]
    async fn test_status_rejects_malformed_imei() {
        let result = get_status(State(state()), Path("12345".to_string())).await;
        assert!(matches!(result, Err(AppError::InvalidImei(_))));
    }

    #[tokio::test]
    async fn test_bad_check_digit_is_rejected_not_offline() {
        let result = get_reading(State(state()), Path("490154203237519".to_string())).await;
        assert!(matches!(
            result,
            Err(AppError::InvalidImei(ImeiError::Checksum {
                expected: 8,
                actual: 9
            }))
        ));
    }

    #[tokio::test]
    async fn test_status_of_unknown_device_is_offline() {
        let Json(report) = get_status(State(state()), Path("490154203237518".to_string()))
            .await
            .unwrap();
        assert_eq!(report.status, DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn test_reading_served_by_live_session() {
        let state = state();
        let imei: DeviceId = "490154203237518".parse().unwrap();
        let (endpoint, mut inbox) = query::channel();
        state.registry.register_if_absent(imei.clone(), endpoint);

        let captured = CapturedReading {
            reading: Reading {
                temperature: 12.0,
                battery: 80.0,
                ..Reading::default()
            },
            captured_at: 7,
        };
        tokio::spawn(async move {
            if let Some(q) = inbox.recv().await {
                q.answer(Some(captured));
            }
        });

        let Json(report) = get_reading(State(state.clone()), Path(imei.to_string()))
            .await
            .unwrap();
        assert_eq!(report.device.status, DeviceStatus::Online);
        assert_eq!(report.reading, Some(captured.reading));
        assert_eq!(report.time, Some(7));
    }

    #[tokio::test]
    async fn test_stats_counts_registered_devices() {
        let state = state();
        let (endpoint, _inbox) = query::channel();
        state
            .registry
            .register_if_absent("490154203237518".parse().unwrap(), endpoint);

        let Json(stats) = get_stats(State(state)).await;
        assert_eq!(stats.online_devices, 1);
        assert_eq!(stats.active_sessions, 0);
    }
}
