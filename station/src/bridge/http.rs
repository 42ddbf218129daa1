//! HTTP bridge for the operator frontend. Read endpoints serve JSON
//! snapshots; control endpoints drive the session lifecycle.

use crate::bridge::model::RecordRequest;
use crate::system::CaptureSystem;
use log::info;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::{http::StatusCode, Filter, Reply};
use wriplecore::{SessionError, SessionResult};

fn with_system(
    system: Arc<CaptureSystem>,
) -> impl Filter<Extract = (Arc<CaptureSystem>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || system.clone())
}

fn session_reply(result: SessionResult<()>) -> impl Reply {
    match result {
        Ok(()) => warp::reply::with_status(
            warp::reply::json(&json!({"status": "ok"})),
            StatusCode::OK,
        ),
        Err(err) => {
            let status = match err {
                SessionError::AlreadyRunning | SessionError::NotRunning => StatusCode::CONFLICT,
                SessionError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warp::reply::with_status(
                warp::reply::json(&json!({"status": "error", "message": err.to_string()})),
                status,
            )
        }
    }
}

pub fn routes(
    system: Arc<CaptureSystem>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let system_status = warp::path("system_status")
        .and(warp::get())
        .and(with_system(system.clone()))
        .map(|system: Arc<CaptureSystem>| warp::reply::json(&system.system_status()));

    let monitor_status = warp::path("monitor_status")
        .and(warp::get())
        .and(with_system(system.clone()))
        .map(|system: Arc<CaptureSystem>| warp::reply::json(&system.monitor_status()));

    let presence_status = warp::path("presence_status")
        .and(warp::get())
        .and(with_system(system.clone()))
        .map(|system: Arc<CaptureSystem>| warp::reply::json(&system.presence_status()));

    let heatmap = warp::path("heatmap")
        .and(warp::get())
        .and(with_system(system.clone()))
        .map(|system: Arc<CaptureSystem>| {
            warp::reply::json(&system.monitor_status().heatmap)
        });

    let rdm = warp::path("rdm")
        .and(warp::get())
        .and(with_system(system.clone()))
        .map(|system: Arc<CaptureSystem>| warp::reply::json(&system.rdm_map()));

    let radar = warp::path("radar")
        .and(warp::get())
        .and(with_system(system.clone()))
        .map(|system: Arc<CaptureSystem>| warp::reply::json(&system.radar_snapshot()));

    let start_monitoring = warp::path("start_monitoring")
        .and(warp::post())
        .and(with_system(system.clone()))
        .and_then(|system: Arc<CaptureSystem>| async move {
            Ok::<_, warp::Rejection>(session_reply(system.start_monitoring().await))
        });

    let start_recording = warp::path("start_recording")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_system(system.clone()))
        .and_then(|request: RecordRequest, system: Arc<CaptureSystem>| async move {
            Ok::<_, warp::Rejection>(session_reply(
                system.start_recording(request.labels).await,
            ))
        });

    let stop_capturing = warp::path("stop_capturing")
        .and(warp::post())
        .and(with_system(system))
        .and_then(|system: Arc<CaptureSystem>| async move {
            Ok::<_, warp::Rejection>(session_reply(system.stop().await))
        });

    system_status
        .or(monitor_status)
        .or(presence_status)
        .or(heatmap)
        .or(rdm)
        .or(radar)
        .or(start_monitoring)
        .or(start_recording)
        .or(stop_capturing)
}

/// Serves the bridge on the current runtime until the process exits.
pub fn spawn(system: Arc<CaptureSystem>, addr: SocketAddr) {
    info!("HTTP bridge listening on {addr}");
    tokio::spawn(warp::serve(routes(system)).run(addr));
}

#[cfg(test)]
mod tests {
    use super::*;
    use wriplecore::PipelineConfig;

    fn test_system() -> Arc<CaptureSystem> {
        Arc::new(CaptureSystem::new(PipelineConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn status_endpoints_serve_json() {
        let routes = routes(test_system());

        let response = warp::test::request()
            .path("/system_status")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = String::from_utf8_lossy(response.body());
        assert!(body.contains("\"mode\":\"idle\""));

        let response = warp::test::request()
            .path("/monitor_status")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request().path("/rdm").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "[]");
    }

    #[tokio::test]
    async fn stop_without_a_session_conflicts() {
        let routes = routes(test_system());
        let response = warp::test::request()
            .method("POST")
            .path("/stop_capturing")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_path_rejects() {
        let routes = routes(test_system());
        let response = warp::test::request().path("/nope").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
