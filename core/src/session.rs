//! Shared session state.
//!
//! This is the only structure mutated by more than one task: the
//! transmitter pushes send timestamps and checks its stop flag, the
//! receive loop checks its own, and the routing worker drains the
//! timestamp FIFO. Everything else in the pipeline is owned by a single
//! session and touched only from its routing worker.

use crate::prelude::{SessionError, SessionMode, SessionResult};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct SessionState {
    mode: SessionMode,
    is_listening: bool,
    is_transmitting: bool,
    device_ip: Option<IpAddr>,
    /// Pending transmit instants, paired positionally with replies.
    tx_timestamps: VecDeque<i64>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            mode: SessionMode::Idle,
            is_listening: false,
            is_transmitting: false,
            device_ip: None,
            tx_timestamps: VecDeque::new(),
        }
    }
}

/// Cloneable handle to the shared session state.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState::new())),
        }
    }

    fn guard(&self) -> MutexGuard<'_, SessionState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Idle -> Monitoring|Recording. Fails if a session is running.
    pub fn begin(&self, mode: SessionMode) -> SessionResult<()> {
        let mut state = self.guard();
        if state.mode != SessionMode::Idle {
            return Err(SessionError::AlreadyRunning);
        }
        state.mode = mode;
        Ok(())
    }

    /// Any mode -> Idle, resetting all per-session fields except the
    /// learned device IP. Fails when already idle.
    pub fn end(&self) -> SessionResult<()> {
        let mut state = self.guard();
        if state.mode == SessionMode::Idle {
            return Err(SessionError::NotRunning);
        }
        state.mode = SessionMode::Idle;
        state.is_listening = false;
        state.is_transmitting = false;
        state.tx_timestamps.clear();
        Ok(())
    }

    pub fn mode(&self) -> SessionMode {
        self.guard().mode
    }

    pub fn is_listening(&self) -> bool {
        self.guard().is_listening
    }

    pub fn set_listening(&self, listening: bool) {
        self.guard().is_listening = listening;
    }

    pub fn is_transmitting(&self) -> bool {
        self.guard().is_transmitting
    }

    pub fn set_transmitting(&self, transmitting: bool) {
        self.guard().is_transmitting = transmitting;
    }

    pub fn device_ip(&self) -> Option<IpAddr> {
        self.guard().device_ip
    }

    pub fn set_device_ip(&self, ip: IpAddr) {
        self.guard().device_ip = Some(ip);
    }

    /// Forgets the learned address, forcing rediscovery on next use.
    pub fn clear_device_ip(&self) {
        self.guard().device_ip = None;
    }

    /// Appends a send instant, evicting the oldest entries beyond the
    /// bound so a silent device cannot grow the FIFO forever.
    pub fn push_tx_timestamp(&self, timestamp: i64, bound: usize) {
        let mut state = self.guard();
        while state.tx_timestamps.len() >= bound.max(1) {
            state.tx_timestamps.pop_front();
        }
        state.tx_timestamps.push_back(timestamp);
    }

    pub fn pop_tx_timestamp(&self) -> Option<i64> {
        self.guard().tx_timestamps.pop_front()
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_transitions() {
        let session = SessionHandle::new();
        assert_eq!(session.mode(), SessionMode::Idle);
        assert!(session.end().is_err());

        session.begin(SessionMode::Monitoring).unwrap();
        assert_eq!(session.mode(), SessionMode::Monitoring);
        assert!(matches!(
            session.begin(SessionMode::Recording),
            Err(SessionError::AlreadyRunning)
        ));

        session.end().unwrap();
        assert_eq!(session.mode(), SessionMode::Idle);
    }

    #[test]
    fn end_resets_flags_and_fifo_but_keeps_device_ip() {
        let session = SessionHandle::new();
        session.begin(SessionMode::Recording).unwrap();
        session.set_listening(true);
        session.set_transmitting(true);
        session.set_device_ip("192.168.4.1".parse().unwrap());
        session.push_tx_timestamp(1, 8);

        session.end().unwrap();
        assert!(!session.is_listening());
        assert!(!session.is_transmitting());
        assert!(session.pop_tx_timestamp().is_none());
        assert!(session.device_ip().is_some());
    }

    #[test]
    fn tx_fifo_is_bounded_and_ordered() {
        let session = SessionHandle::new();
        for i in 0..5 {
            session.push_tx_timestamp(i, 3);
        }
        assert_eq!(session.pop_tx_timestamp(), Some(2));
        assert_eq!(session.pop_tx_timestamp(), Some(3));
        assert_eq!(session.pop_tx_timestamp(), Some(4));
        assert_eq!(session.pop_tx_timestamp(), None);
    }
}
