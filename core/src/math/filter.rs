/// Zero-phase single-pole low-pass filter.
///
/// Runs one forward and one backward pass over the series so the output
/// is not phase-shifted relative to the input, which matters when the
/// filtered window is differenced against its most recent sample.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    alpha: f64,
}

impl LowPassFilter {
    pub fn new(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let dt = 1.0 / sample_rate_hz.max(f64::EPSILON);
        let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz.max(f64::EPSILON));
        Self {
            alpha: dt / (rc + dt),
        }
    }

    pub fn smooth(&self, series: &[f64]) -> Vec<f64> {
        if series.len() < 2 {
            return series.to_vec();
        }

        let mut forward = Vec::with_capacity(series.len());
        let mut state = series[0];
        for &value in series {
            state += self.alpha * (value - state);
            forward.push(state);
        }

        let mut state = forward[forward.len() - 1];
        for value in forward.iter_mut().rev() {
            state += self.alpha * (*value - state);
            *value = state;
        }
        forward
    }
}
