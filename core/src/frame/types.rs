use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Number of radar targets reported per frame.
pub const RADAR_TARGET_COUNT: usize = 3;
/// Range gates per Doppler row.
pub const RANGE_GATE_COUNT: usize = 16;

/// Firmware wire-format variant. The section count is explicit so the
/// parser never guesses which auxiliary sensors a deployment carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// Three sections: metadata | CSI | Doppler map.
    Combined,
    /// Four sections: metadata | CSI | radar targets | Doppler map.
    #[default]
    Split,
}

impl ProtocolVariant {
    pub fn section_count(&self) -> usize {
        match self {
            ProtocolVariant::Combined => 3,
            ProtocolVariant::Split => 4,
        }
    }

    pub fn carries_radar_targets(&self) -> bool {
        matches!(self, ProtocolVariant::Split)
    }
}

/// One tracked radar target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadarTarget {
    pub x: i32,
    pub y: i32,
    pub speed: i32,
    pub resolution: i32,
}

/// Structured view of one datagram. Immutable after creation.
///
/// `radar_valid` / `doppler_valid` are false when the corresponding
/// section carried the sentinel; the arrays stay zero-filled at their
/// fixed shape so downstream consumers never see a varying layout.
#[derive(Debug, Clone)]
pub struct ParsedFrame {
    pub radar_valid: bool,
    pub doppler_valid: bool,
    pub rx_timestamp: i64,
    pub rssi: i32,
    pub bandwidth: i32,
    pub channel: i32,
    pub antenna: i32,
    /// Interleaved I/Q samples; empty when the CSI section was invalid.
    pub raw_csi: Vec<i32>,
    pub radar_targets: [RadarTarget; RADAR_TARGET_COUNT],
    /// Doppler x range energy matrix, rows x 16.
    pub doppler_matrix: Array2<f64>,
}

impl ParsedFrame {
    pub fn csi_valid(&self) -> bool {
        !self.raw_csi.is_empty()
    }
}
