pub mod metrics;

pub use metrics::LinkMetrics;
