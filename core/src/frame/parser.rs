//! Parser for the `|`-delimited telemetry line each datagram carries.
//!
//! Rejection is always local: a malformed datagram produces a
//! [`FrameError`] that the routing worker logs and drops, and a missing
//! auxiliary reading degrades to a zero-filled placeholder instead of
//! failing the frame.

use crate::config::PipelineConfig;
use crate::frame::types::{
    ParsedFrame, ProtocolVariant, RadarTarget, RADAR_TARGET_COUNT, RANGE_GATE_COUNT,
};
use ndarray::Array2;

/// Sentinel prefix meaning "no reading this tick".
const SENTINEL: char = '!';

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("datagram is not valid UTF-8")]
    Encoding,
    #[error("expected {expected} sections, found {found}")]
    SectionCount { expected: usize, found: usize },
    #[error("malformed metadata: {0}")]
    Metadata(String),
    #[error("malformed CSI payload: {0}")]
    Csi(String),
}

/// Per-sensor miss counters with fixed tolerances. Owned by the caller
/// and passed in so the parser itself stays a pure transformation.
#[derive(Debug, Clone)]
pub struct SensorLiveness {
    radar_misses: u32,
    doppler_misses: u32,
    radar_tolerance: u32,
    doppler_tolerance: u32,
}

impl SensorLiveness {
    pub fn new(radar_tolerance: u32, doppler_tolerance: u32) -> Self {
        Self {
            radar_misses: 0,
            doppler_misses: 0,
            radar_tolerance,
            doppler_tolerance,
        }
    }

    pub fn radar_active(&self) -> bool {
        self.radar_misses < self.radar_tolerance
    }

    pub fn doppler_active(&self) -> bool {
        self.doppler_misses < self.doppler_tolerance
    }

    pub fn radar_misses(&self) -> u32 {
        self.radar_misses
    }

    pub fn doppler_misses(&self) -> u32 {
        self.doppler_misses
    }

    pub fn reset(&mut self) {
        self.radar_misses = 0;
        self.doppler_misses = 0;
    }

    fn note_radar(&mut self, valid: bool) {
        if valid {
            self.radar_misses = 0;
        } else {
            self.radar_misses = self.radar_misses.saturating_add(1);
        }
    }

    fn note_doppler(&mut self, valid: bool) {
        if valid {
            self.doppler_misses = 0;
        } else {
            self.doppler_misses = self.doppler_misses.saturating_add(1);
        }
    }
}

impl Default for SensorLiveness {
    fn default() -> Self {
        // Radar targets update faster than the Doppler map, so its
        // disconnect tolerance is tighter.
        Self::new(10, 30)
    }
}

pub struct FrameParser {
    variant: ProtocolVariant,
    doppler_rows: usize,
    /// Known-good interleaved I/Q counts; empty disables the check.
    known_csi_lengths: Vec<usize>,
}

impl FrameParser {
    pub fn new(variant: ProtocolVariant, doppler_rows: usize) -> Self {
        Self {
            variant,
            doppler_rows,
            known_csi_lengths: vec![256, 384],
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut parser = Self::new(config.variant, config.rdm.doppler_rows);
        parser.known_csi_lengths = config.csi.known_csi_lengths.clone();
        parser
    }

    pub fn parse(
        &self,
        payload: &[u8],
        liveness: &mut SensorLiveness,
    ) -> Result<ParsedFrame, FrameError> {
        let text = std::str::from_utf8(payload).map_err(|_| FrameError::Encoding)?;
        let sections: Vec<&str> = text.trim().split('|').map(str::trim).collect();

        let expected = self.variant.section_count();
        if sections.len() != expected {
            return Err(FrameError::SectionCount {
                expected,
                found: sections.len(),
            });
        }

        let (rx_timestamp, rssi, bandwidth, channel, antenna) = parse_metadata(sections[0])?;
        let raw_csi = self.parse_csi(sections[1])?;

        let (radar_valid, radar_targets) = match self.variant {
            ProtocolVariant::Split => {
                let (valid, targets) = parse_radar_section(sections[2]);
                liveness.note_radar(valid);
                (valid, targets)
            }
            // The combined variant carries no target-tracking sensor;
            // its miss counter is left untouched.
            ProtocolVariant::Combined => (false, [RadarTarget::default(); RADAR_TARGET_COUNT]),
        };

        let doppler_section = match self.variant {
            ProtocolVariant::Split => sections[3],
            ProtocolVariant::Combined => sections[2],
        };
        let (doppler_valid, doppler_matrix) =
            parse_doppler_section(doppler_section, self.doppler_rows);
        liveness.note_doppler(doppler_valid);

        Ok(ParsedFrame {
            radar_valid,
            doppler_valid,
            rx_timestamp,
            rssi,
            bandwidth,
            channel,
            antenna,
            raw_csi,
            radar_targets,
            doppler_matrix,
        })
    }

    /// CSI integers, bare or inside `[ ]`, space- or comma-delimited.
    /// An odd count or an unexpected length invalidates the CSI for this
    /// frame only; garbage that is not an integer rejects the frame.
    fn parse_csi(&self, section: &str) -> Result<Vec<i32>, FrameError> {
        let body = section
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim();

        let mut values = Vec::new();
        for token in body.split(|c| c == ' ' || c == ',').filter(|t| !t.is_empty()) {
            let value = token
                .parse::<i32>()
                .map_err(|_| FrameError::Csi(format!("non-integer token `{token}`")))?;
            values.push(value);
        }

        if values.len() % 2 != 0 {
            log::debug!("odd CSI length {}; dropping CSI for this frame", values.len());
            return Ok(Vec::new());
        }
        if !self.known_csi_lengths.is_empty() && !self.known_csi_lengths.contains(&values.len()) {
            log::debug!(
                "unexpected CSI length {}; dropping CSI for this frame",
                values.len()
            );
            return Ok(Vec::new());
        }
        Ok(values)
    }
}

fn parse_metadata(section: &str) -> Result<(i64, i32, i32, i32, i32), FrameError> {
    let fields: Result<Vec<i64>, _> = section.split(',').map(|f| f.trim().parse::<i64>()).collect();
    let fields = fields.map_err(|_| FrameError::Metadata(format!("non-integer field in `{section}`")))?;

    match fields.as_slice() {
        // Full form: timestamp, RSSI, bandwidth, channel, antenna.
        [ts, rssi, bw, ch, ant] => Ok((*ts, *rssi as i32, *bw as i32, *ch as i32, *ant as i32)),
        // Short form carries only the channel.
        [ts, rssi, ch] => Ok((*ts, *rssi as i32, 0, *ch as i32, 0)),
        other => Err(FrameError::Metadata(format!(
            "expected 3 or 5 fields, found {}",
            other.len()
        ))),
    }
}

/// Auxiliary radar-target section: 12 ints reshaped into 3 targets.
/// Sentinel or malformed content degrades to zeroed targets.
fn parse_radar_section(section: &str) -> (bool, [RadarTarget; RADAR_TARGET_COUNT]) {
    let zeroed = [RadarTarget::default(); RADAR_TARGET_COUNT];
    if section.starts_with(SENTINEL) {
        return (false, zeroed);
    }

    let values: Result<Vec<i32>, _> = section.split(',').map(|f| f.trim().parse::<i32>()).collect();
    let values = match values {
        Ok(v) if v.len() == RADAR_TARGET_COUNT * 4 => v,
        _ => return (false, zeroed),
    };

    let mut targets = zeroed;
    for (i, chunk) in values.chunks_exact(4).enumerate() {
        targets[i] = RadarTarget {
            x: chunk[0],
            y: chunk[1],
            speed: chunk[2],
            resolution: chunk[3],
        };
    }
    (true, targets)
}

/// Doppler map section: rows x 16 ints. Sentinel or malformed content
/// degrades to a zero-filled matrix of the fixed shape.
fn parse_doppler_section(section: &str, rows: usize) -> (bool, Array2<f64>) {
    let zeroed = Array2::zeros((rows, RANGE_GATE_COUNT));
    if section.starts_with(SENTINEL) {
        return (false, zeroed);
    }

    let values: Result<Vec<f64>, _> = section
        .split(',')
        .map(|f| f.trim().parse::<i64>().map(|v| v as f64))
        .collect();
    let values = match values {
        Ok(v) if v.len() == rows * RANGE_GATE_COUNT => v,
        _ => return (false, zeroed),
    };

    match Array2::from_shape_vec((rows, RANGE_GATE_COUNT), values) {
        Ok(matrix) => (true, matrix),
        Err(_) => (false, zeroed),
    }
}
