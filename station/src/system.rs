//! Capture orchestration: wires the session, router, and network
//! manager together and serves the snapshots the HTTP bridge exposes.

use crate::bridge::model::{MonitorStatus, PresenceStatus, RadarSnapshot, SystemStatus};
use anyhow::Context;
use log::info;
use std::sync::Arc;
use wriplecore::{
    FrameRouter, LinkMetrics, NetworkManager, PipelineConfig, PresenceLabel, PresenceModel,
    RecordLabels, SessionHandle, SessionMode, SessionResult,
};

/// RSSI window used for the link-quality statistics.
const RSSI_STATS_WINDOW: usize = 120;

/// Baseline presence model: the appended partial-sum delta feature
/// against a fixed threshold. Trained models plug in through
/// [`PresenceModel`] without touching the capture path.
pub struct VarianceThresholdModel {
    delta_threshold: f64,
}

impl VarianceThresholdModel {
    pub fn new(delta_threshold: f64) -> Self {
        Self { delta_threshold }
    }
}

impl Default for VarianceThresholdModel {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl PresenceModel for VarianceThresholdModel {
    fn predict(&self, features: &[f64]) -> (PresenceLabel, f64) {
        let delta = features.last().copied().unwrap_or(0.0);
        if delta >= self.delta_threshold {
            let confidence = (delta / (2.0 * self.delta_threshold)).min(1.0);
            (PresenceLabel::Present, confidence)
        } else {
            let confidence = 1.0 - (delta / self.delta_threshold).min(1.0);
            (PresenceLabel::Absent, confidence)
        }
    }
}

pub struct CaptureSystem {
    session: SessionHandle,
    router: Arc<FrameRouter>,
    manager: NetworkManager,
    model: Box<dyn PresenceModel>,
}

impl CaptureSystem {
    pub fn new(config: PipelineConfig) -> anyhow::Result<Self> {
        config.validate().context("validating pipeline config")?;
        let config = Arc::new(config);
        let session = SessionHandle::new();
        let metrics = Arc::new(LinkMetrics::new());
        let router = Arc::new(
            FrameRouter::new(&config, session.clone()).context("building frame router")?,
        );
        let manager =
            NetworkManager::new(config, session.clone(), router.clone(), metrics);

        Ok(Self {
            session,
            router,
            manager,
            model: Box::new(VarianceThresholdModel::default()),
        })
    }

    pub fn with_model(mut self, model: Box<dyn PresenceModel>) -> Self {
        self.model = model;
        self
    }

    pub async fn start_monitoring(&self) -> SessionResult<()> {
        info!("starting monitoring session");
        self.manager.start(SessionMode::Monitoring).await
    }

    pub async fn start_recording(&self, labels: RecordLabels) -> SessionResult<()> {
        info!("starting recording session");
        self.router.set_record_labels(labels);
        self.manager.start(SessionMode::Recording).await
    }

    pub async fn stop(&self) -> SessionResult<()> {
        self.manager.stop().await
    }

    pub fn set_record_labels(&self, labels: RecordLabels) {
        self.router.set_record_labels(labels);
    }

    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            mode: self.session.mode(),
            listening: self.session.is_listening(),
            transmitting: self.session.is_transmitting(),
            device_ip: self.session.device_ip().map(|ip| ip.to_string()),
            packet_loss: self.manager.packet_loss(),
            recorded_rows: self.router.recorded_rows(),
        }
    }

    pub fn monitor_status(&self) -> MonitorStatus {
        let (radar_active, doppler_active) = self.router.sensor_liveness();
        let (rssi_mean, rssi_std) = self.router.rssi_stats(RSSI_STATS_WINDOW);
        MonitorStatus {
            queue_len: self.router.csi_queue_len(),
            amplitude_variance: self.router.amplitude_variance(),
            heatmap: self.router.heatmap(),
            distance: self.router.distance(),
            radar_active,
            doppler_active,
            rssi_mean,
            rssi_std,
        }
    }

    pub fn presence_status(&self) -> PresenceStatus {
        let features = self.router.feature_window();
        let (label, confidence) = self.model.predict(&features);
        PresenceStatus { label, confidence }
    }

    pub fn rdm_map(&self) -> Vec<(usize, usize, f64)> {
        self.router.rdm_map()
    }

    pub fn radar_snapshot(&self) -> RadarSnapshot {
        RadarSnapshot {
            targets: self.router.radar_targets().to_vec(),
        }
    }
}
