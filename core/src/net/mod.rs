pub mod manager;
pub mod wifi;

pub use manager::{timestamp_us, NetworkManager};
