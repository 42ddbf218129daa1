pub mod csi;
pub mod queue;
pub mod rdm;

pub use csi::CsiProcessor;
pub use queue::SampleQueue;
pub use rdm::{viz_thresholds_from_json, RdmEstimator, RdmThresholdError};
