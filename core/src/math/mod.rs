pub mod filter;
pub mod stats;

pub use filter::LowPassFilter;
pub use stats::StatsHelper;
