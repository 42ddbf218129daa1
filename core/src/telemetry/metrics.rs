use std::sync::Mutex;

/// Per-session transmit/receive counters shared between the transmitter
/// task and the receive loop. Loss is computed on demand and never
/// persisted beyond the session.
pub struct LinkMetrics {
    inner: Mutex<Counters>,
}

#[derive(Default)]
struct Counters {
    tx: u64,
    rx: u64,
}

impl LinkMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counters::default()),
        }
    }

    pub fn record_tx(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.tx += 1;
        }
    }

    pub fn record_rx(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.rx += 1;
        }
    }

    /// `(tx, rx)` snapshot.
    pub fn snapshot(&self) -> (u64, u64) {
        if let Ok(counters) = self.inner.lock() {
            (counters.tx, counters.rx)
        } else {
            (0, 0)
        }
    }

    /// Fraction of requests with no observed reply; 0.0 before the
    /// first transmission.
    pub fn packet_loss(&self) -> f64 {
        let (tx, rx) = self.snapshot();
        if tx == 0 {
            return 0.0;
        }
        (tx.saturating_sub(rx)) as f64 / tx as f64
    }

    pub fn reset(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            *counters = Counters::default();
        }
    }
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}
