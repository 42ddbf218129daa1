//! Wi-Fi CSI and short-range radar sensing pipeline.
//!
//! The crate turns a UDP stream of `|`-delimited telemetry lines into
//! live presence signals: a CSI amplitude heatmap, a smoothed
//! Doppler-range distance estimate, and a denoised feature window for
//! presence inference. The [`net::NetworkManager`] owns the session
//! lifecycle; the [`router::FrameRouter`] is the single consumer of
//! received datagrams.

pub mod config;
pub mod frame;
pub mod math;
pub mod model;
pub mod net;
pub mod prelude;
pub mod processing;
pub mod record;
pub mod router;
pub mod session;
pub mod telemetry;

pub use config::{CsiConfig, NetworkConfig, PipelineConfig, RdmConfig, RecordConfig};
pub use frame::{FrameParser, ParsedFrame, ProtocolVariant, RadarTarget, SensorLiveness};
pub use model::{PresenceLabel, PresenceModel};
pub use net::NetworkManager;
pub use prelude::{RawDatagram, SessionError, SessionMode, SessionResult};
pub use router::{FrameRouter, RecordLabels};
pub use session::SessionHandle;
pub use telemetry::LinkMetrics;
