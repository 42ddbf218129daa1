use serde::{Deserialize, Serialize};
use wriplecore::{PresenceLabel, RadarTarget, SessionMode};

/// Session-level snapshot served by `GET /system_status`.
#[derive(Clone, Debug, Serialize)]
pub struct SystemStatus {
    pub mode: SessionMode,
    pub listening: bool,
    pub transmitting: bool,
    pub device_ip: Option<String>,
    pub packet_loss: f64,
    pub recorded_rows: usize,
}

/// Live signal snapshot served by `GET /monitor_status`.
#[derive(Clone, Debug, Serialize)]
pub struct MonitorStatus {
    pub queue_len: usize,
    pub amplitude_variance: f64,
    pub heatmap: Vec<f64>,
    pub distance: f64,
    pub radar_active: bool,
    pub doppler_active: bool,
    pub rssi_mean: f64,
    pub rssi_std: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PresenceStatus {
    pub label: PresenceLabel,
    pub confidence: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct RadarSnapshot {
    pub targets: Vec<RadarTarget>,
}

/// Body of `POST /start_recording`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RecordRequest {
    pub labels: wriplecore::RecordLabels,
}
