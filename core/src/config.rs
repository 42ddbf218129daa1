//! Typed configuration for the sensing pipeline.
//!
//! Every externally tunable value lives here with an explicit default;
//! the station driver deserializes the whole tree from YAML and calls
//! [`PipelineConfig::validate`] once before a session starts.

use crate::frame::ProtocolVariant;
use crate::prelude::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Network, discovery, and transmission cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// SSID of the device's access point. An empty string disables the
    /// association gate (wired or loopback test rigs).
    pub ap_ssid: String,
    pub ap_password: String,
    /// Subnet broadcast address used for device discovery.
    pub broadcast_ip: String,
    /// Last learned device IP, if any.
    pub device_ip: Option<String>,
    /// UDP port the device listens on.
    pub request_port: u16,
    /// Local port the receive socket binds to.
    pub listen_port: u16,
    /// Fixed request payloads. These must stay byte-for-byte compatible
    /// with the deployed firmware.
    pub csi_request_payload: String,
    pub stop_request_payload: String,
    pub reconnect_payload: String,
    pub discovery_payload: String,
    /// Transmit cadence per mode, in milliseconds.
    pub monitor_interval_ms: u64,
    pub record_interval_ms: u64,
    pub discovery_retries: u32,
    pub discovery_interval_ms: u64,
    /// Receive timeout; also bounds stop latency for the receive loop.
    pub socket_timeout_ms: u64,
    pub recv_buffer_size: usize,
    /// Depth of the bounded channel feeding the routing worker.
    pub worker_channel_depth: usize,
    /// Bound on the pending transmit-timestamp FIFO.
    pub tx_fifo_depth: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ap_ssid: "Wriple".to_string(),
            ap_password: String::new(),
            broadcast_ip: "192.168.4.255".to_string(),
            device_ip: None,
            request_port: 5001,
            listen_port: 5001,
            csi_request_payload: "Wriple".to_string(),
            stop_request_payload: "Stop".to_string(),
            reconnect_payload: "Connect".to_string(),
            discovery_payload: "Broadcast".to_string(),
            monitor_interval_ms: 33,
            record_interval_ms: 33,
            discovery_retries: 5,
            discovery_interval_ms: 500,
            socket_timeout_ms: 250,
            recv_buffer_size: 4096,
            worker_channel_depth: 64,
            tx_fifo_depth: 64,
        }
    }
}

/// CSI processing settings: queue bounds, heatmap contrast, and the
/// ML feature window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsiConfig {
    pub monitor_queue_limit: usize,
    /// Half-open subcarrier slices kept at ingestion time.
    pub amp_subcarrier_slices: Vec<(usize, usize)>,
    /// Half-open slices (over the stored sample) used for the heatmap.
    pub heat_subcarrier_slices: Vec<(usize, usize)>,
    pub heat_signal_window: usize,
    pub heat_diff_threshold: f64,
    pub heat_penalty_factor: f64,
    pub pred_signal_window: usize,
    pub lowpass_cutoff: f64,
    pub lowpass_sample_rate: f64,
    pub shrink_threshold: f64,
    pub shrink_floor: f64,
    pub shrink_decay: f64,
    /// Width of the leading partial amplitude sum used as the delta feature.
    pub partial_sum_width: usize,
    /// Known-good interleaved I/Q counts; empty disables the check.
    pub known_csi_lengths: Vec<usize>,
}

impl Default for CsiConfig {
    fn default() -> Self {
        Self {
            monitor_queue_limit: 90,
            amp_subcarrier_slices: vec![(0, 128)],
            heat_subcarrier_slices: vec![(3, 88)],
            heat_signal_window: 30,
            heat_diff_threshold: 5.0,
            heat_penalty_factor: 1.0,
            pred_signal_window: 7,
            lowpass_cutoff: 0.1,
            lowpass_sample_rate: 1.0,
            shrink_threshold: 8.0,
            shrink_floor: 0.1,
            shrink_decay: 1.0,
            partial_sum_width: 52,
            known_csi_lengths: vec![256, 384],
        }
    }
}

/// Doppler-range estimator settings. The per-gate thresholds and the
/// authoritative energy row are calibration inputs, not adaptive values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RdmConfig {
    pub mmwave_queue_limit: usize,
    pub doppler_rows: usize,
    pub range_gates: usize,
    /// Row of the Doppler x range matrix read as the energy-per-gate
    /// vector. Confirm against the deployed sensor's row layout.
    pub energy_row: usize,
    /// Meters per range gate.
    pub gate_distance: f64,
    pub absence_tolerance: u32,
    pub smoothing_alpha: f64,
    pub gate_thresholds: Vec<f64>,
    pub heatmap_max_scaler: f64,
    /// Optional JSON file holding the per-cell visualization thresholds.
    pub viz_thresholds_path: Option<PathBuf>,
}

impl Default for RdmConfig {
    fn default() -> Self {
        Self {
            mmwave_queue_limit: 12,
            doppler_rows: 20,
            range_gates: 16,
            energy_row: 9,
            gate_distance: 0.7,
            absence_tolerance: 6,
            smoothing_alpha: 0.6,
            gate_thresholds: vec![60.0; 16],
            heatmap_max_scaler: 400.0,
            viz_thresholds_path: None,
        }
    }
}

/// Recording-session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    /// Packets per recording session; reaching it ends the session.
    pub record_packet_limit: usize,
    pub csv_directory: PathBuf,
    pub csv_file_prefix: String,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            record_packet_limit: 150,
            csv_directory: PathBuf::from("data/recorded"),
            csv_file_prefix: "WRIPLE_DATA_".to_string(),
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub variant: ProtocolVariant,
    pub network: NetworkConfig,
    pub csi: CsiConfig,
    pub rdm: RdmConfig,
    pub record: RecordConfig,
}

impl PipelineConfig {
    /// Checks cross-field consistency once, before a session starts.
    pub fn validate(&self) -> SessionResult<()> {
        if self.rdm.gate_thresholds.len() != self.rdm.range_gates {
            return Err(SessionError::InvalidConfig(format!(
                "expected {} gate thresholds, found {}",
                self.rdm.range_gates,
                self.rdm.gate_thresholds.len()
            )));
        }
        if self.rdm.energy_row >= self.rdm.doppler_rows {
            return Err(SessionError::InvalidConfig(format!(
                "energy row {} outside the {} configured Doppler rows",
                self.rdm.energy_row, self.rdm.doppler_rows
            )));
        }
        if !(0.0..=1.0).contains(&self.rdm.smoothing_alpha) {
            return Err(SessionError::InvalidConfig(
                "smoothing alpha must lie in [0, 1]".to_string(),
            ));
        }
        if self.csi.heat_signal_window == 0 || self.csi.pred_signal_window == 0 {
            return Err(SessionError::InvalidConfig(
                "signal windows must be nonzero".to_string(),
            ));
        }
        if self.network.worker_channel_depth == 0 {
            return Err(SessionError::InvalidConfig(
                "worker channel depth must be nonzero".to_string(),
            ));
        }
        for &(start, end) in self
            .csi
            .amp_subcarrier_slices
            .iter()
            .chain(self.csi.heat_subcarrier_slices.iter())
        {
            if start >= end {
                return Err(SessionError::InvalidConfig(format!(
                    "empty subcarrier slice ({start}, {end})"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn mismatched_gate_thresholds_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.rdm.gate_thresholds = vec![10.0; 4];
        assert!(matches!(
            cfg.validate(),
            Err(SessionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn energy_row_outside_matrix_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.rdm.energy_row = 20;
        assert!(cfg.validate().is_err());
    }
}
