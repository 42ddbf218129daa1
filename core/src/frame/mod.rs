pub mod parser;
pub mod types;

pub use parser::{FrameError, FrameParser, SensorLiveness};
pub use types::{ParsedFrame, ProtocolVariant, RadarTarget, RADAR_TARGET_COUNT, RANGE_GATE_COUNT};
