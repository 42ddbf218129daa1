use serde::{Deserialize, Serialize};

/// Capture session mode. `Idle` means no session is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Idle,
    Monitoring,
    Recording,
}

/// Raw UDP datagram handed from the receive loop to the routing worker.
#[derive(Debug, Clone)]
pub struct RawDatagram {
    pub payload: Vec<u8>,
    /// Arrival instant in microseconds since the Unix epoch, wrapped to
    /// nine digits to match the device timestamp convention.
    pub received_at_us: i64,
}

/// Session-fatal faults. Everything else in the pipeline is recovered
/// locally and logged (see the parser and the receive loop).
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("not associated with access point `{0}`")]
    ApNotConnected(String),
    #[error("device unreachable after {attempts} discovery attempts")]
    DeviceUnreachable { attempts: u32 },
    #[error("socket setup failed: {0}")]
    Socket(#[from] std::io::Error),
    #[error("a capture session is already running")]
    AlreadyRunning,
    #[error("no capture session is running")]
    NotRunning,
    #[error("record sink setup failed: {0}")]
    RecordSink(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
