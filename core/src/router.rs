//! Frame routing: the single consumer of the receive channel.
//!
//! All processors live behind one mutex owned by the router, so every
//! datagram is parsed, queued, and (while recording) persisted by
//! exactly one worker. Query methods take the same lock briefly to
//! serve status endpoints.

use crate::config::PipelineConfig;
use crate::frame::{FrameParser, ParsedFrame, RadarTarget, SensorLiveness, RADAR_TARGET_COUNT};
use crate::math::StatsHelper;
use crate::prelude::{RawDatagram, SessionError, SessionResult};
use crate::processing::{viz_thresholds_from_json, CsiProcessor, RdmEstimator, SampleQueue};
use crate::record::RecordSink;
use crate::session::SessionHandle;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Ground-truth annotations written into every recorded row. Supplied
/// by the operator when a recording session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordLabels {
    pub presence: u8,
    pub target_count: u8,
    pub state: String,
    pub activity: String,
    pub angle: i32,
    pub distance: f64,
    pub obstructed: u8,
    pub obstruction: String,
    pub spacing: String,
}

impl Default for RecordLabels {
    fn default() -> Self {
        Self {
            presence: 0,
            target_count: 0,
            state: "none".to_string(),
            activity: "none".to_string(),
            angle: 0,
            distance: 0.0,
            obstructed: 0,
            obstruction: "none".to_string(),
            spacing: "none".to_string(),
        }
    }
}

/// What the worker should do after one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Frame processed (or dropped locally); keep going.
    Continue,
    /// The recording packet limit was reached; the session should end.
    RecordLimitReached,
}

struct RouterState {
    csi: CsiProcessor,
    rdm: RdmEstimator,
    liveness: SensorLiveness,
    rssi: SampleQueue<f64>,
    latest_targets: [RadarTarget; RADAR_TARGET_COUNT],
    labels: RecordLabels,
    recorder: Option<Box<dyn RecordSink>>,
    recorded_rows: usize,
}

pub struct FrameRouter {
    parser: FrameParser,
    session: SessionHandle,
    record_packet_limit: usize,
    monitor_queue_limit: usize,
    state: Mutex<RouterState>,
}

impl FrameRouter {
    pub fn new(config: &PipelineConfig, session: SessionHandle) -> SessionResult<Self> {
        let mut rdm = RdmEstimator::new(&config.rdm);
        if let Some(path) = &config.rdm.viz_thresholds_path {
            let thresholds =
                viz_thresholds_from_json(path, config.rdm.doppler_rows, config.rdm.range_gates)
                    .map_err(|err| {
                        SessionError::InvalidConfig(format!("visualization thresholds: {err}"))
                    })?;
            rdm.set_viz_thresholds(thresholds);
        }

        Ok(Self {
            parser: FrameParser::from_config(config),
            session,
            record_packet_limit: config.record.record_packet_limit,
            monitor_queue_limit: config.csi.monitor_queue_limit,
            state: Mutex::new(RouterState {
                csi: CsiProcessor::new(&config.csi),
                rdm,
                liveness: SensorLiveness::default(),
                rssi: SampleQueue::with_capacity(config.csi.monitor_queue_limit),
                latest_targets: [RadarTarget::default(); RADAR_TARGET_COUNT],
                labels: RecordLabels::default(),
                recorder: None,
                recorded_rows: 0,
            }),
        })
    }

    fn guard(&self) -> MutexGuard<'_, RouterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Parses and routes one datagram. Malformed datagrams are logged
    /// and dropped without touching processor state. Receipt accounting
    /// happens at the socket, not here: a datagram shed by the routing
    /// channel still counts as received.
    pub fn handle_datagram(&self, datagram: &RawDatagram) -> RouteOutcome {
        let mut state = self.guard();
        let frame = match self.parser.parse(&datagram.payload, &mut state.liveness) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("dropping datagram: {err}");
                return RouteOutcome::Continue;
            }
        };
        // Only accepted frames consume a pending transmit instant.
        let tx_timestamp = self.session.pop_tx_timestamp().unwrap_or(0);

        state.rssi.push(frame.rssi as f64);
        if frame.radar_valid {
            state.latest_targets = frame.radar_targets;
        }
        state.csi.ingest(&frame.raw_csi);
        if frame.doppler_valid {
            state.rdm.ingest(frame.doppler_matrix.clone());
        }

        if state.recorder.is_some() {
            let row = build_row(&state.labels, tx_timestamp, datagram.received_at_us, &frame);
            let written = state
                .recorder
                .as_ref()
                .map(|sink| sink.write(&row))
                .unwrap_or(false);
            if !written {
                warn!("record sink rejected a row");
            }
            state.recorded_rows += 1;
            debug!("recorded row {}/{}", state.recorded_rows, self.record_packet_limit);
            if state.recorded_rows >= self.record_packet_limit {
                return RouteOutcome::RecordLimitReached;
            }
        }

        RouteOutcome::Continue
    }

    /// Resets all per-session processing state and, for recording
    /// sessions, attaches the row sink. The amplitude queue is sized to
    /// the session kind: recording keeps the whole capture in reach.
    pub fn begin_session(&self, recorder: Option<Box<dyn RecordSink>>) {
        let mut state = self.guard();
        let capacity = if recorder.is_some() {
            self.record_packet_limit
        } else {
            self.monitor_queue_limit
        };
        state.csi.set_capacity(capacity);
        state.csi.clear();
        state.rdm.clear();
        state.liveness.reset();
        state.rssi.clear();
        state.latest_targets = [RadarTarget::default(); RADAR_TARGET_COUNT];
        state.recorded_rows = 0;
        state.recorder = recorder;
    }

    /// Drops the row sink (flushing it on drop) and clears session state.
    pub fn end_session(&self) {
        let mut state = self.guard();
        state.recorder = None;
        state.recorded_rows = 0;
        state.csi.clear();
        state.rdm.clear();
        state.rssi.clear();
    }

    pub fn set_record_labels(&self, labels: RecordLabels) {
        self.guard().labels = labels;
    }

    pub fn heatmap(&self) -> Vec<f64> {
        self.guard().csi.heatmap()
    }

    pub fn amplitude_variance(&self) -> f64 {
        self.guard().csi.amplitude_variance()
    }

    pub fn feature_window(&self) -> Vec<f64> {
        self.guard().csi.feature_window()
    }

    pub fn distance(&self) -> f64 {
        self.guard().rdm.current_distance()
    }

    /// `(doppler_row, gate, scaled_energy)` triples for the latest map.
    pub fn rdm_map(&self) -> Vec<(usize, usize, f64)> {
        self.guard().rdm.filtered_map()
    }

    pub fn radar_targets(&self) -> [RadarTarget; RADAR_TARGET_COUNT] {
        self.guard().latest_targets
    }

    /// `(radar_active, doppler_active)`.
    pub fn sensor_liveness(&self) -> (bool, bool) {
        let state = self.guard();
        (state.liveness.radar_active(), state.liveness.doppler_active())
    }

    /// Mean and standard deviation of the newest `window` RSSI readings.
    pub fn rssi_stats(&self, window: usize) -> (f64, f64) {
        let state = self.guard();
        let values: Vec<f64> = state.rssi.window(window).into_iter().copied().collect();
        (StatsHelper::mean(&values), StatsHelper::std_dev(&values))
    }

    pub fn csi_queue_len(&self) -> usize {
        self.guard().csi.queue_len()
    }

    pub fn recorded_rows(&self) -> usize {
        self.guard().recorded_rows
    }
}

fn build_row(
    labels: &RecordLabels,
    tx_timestamp: i64,
    received_at_us: i64,
    frame: &ParsedFrame,
) -> Vec<String> {
    let mut row = vec![
        labels.presence.to_string(),
        labels.target_count.to_string(),
        labels.state.clone(),
        labels.activity.clone(),
        labels.angle.to_string(),
        labels.distance.to_string(),
        labels.obstructed.to_string(),
        labels.obstruction.clone(),
        labels.spacing.clone(),
        tx_timestamp.to_string(),
        received_at_us.to_string(),
        frame.rssi.to_string(),
        frame.bandwidth.to_string(),
        frame.channel.to_string(),
        frame.antenna.to_string(),
        frame
            .raw_csi
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" "),
        frame
            .radar_targets
            .iter()
            .flat_map(|t| [t.x, t.y, t.speed, t.resolution])
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" "),
    ];
    row.extend(crate::record::CsvRecorder::doppler_cells(&frame.doppler_matrix));
    row
}
