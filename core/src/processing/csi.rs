//! CSI signal processing: amplitude extraction, windowed contrast
//! enhancement for the heatmap, and the denoised feature window fed to
//! the presence model.

use crate::config::CsiConfig;
use crate::math::{LowPassFilter, StatsHelper};
use crate::processing::queue::SampleQueue;
use ndarray::{Array1, Array2, Axis};
use num_complex::Complex;

pub struct CsiProcessor {
    amplitudes: SampleQueue<Vec<f64>>,
    /// Subcarrier indices kept at ingestion time.
    amp_subcarriers: Vec<usize>,
    /// Indices into the stored sample used by the heatmap path.
    heat_subcarriers: Vec<usize>,
    heat_window: usize,
    diff_threshold: f64,
    penalty: f64,
    pred_window: usize,
    lowpass: LowPassFilter,
    shrink_threshold: f64,
    shrink_floor: f64,
    shrink_decay: f64,
    partial_sum_width: usize,
    prev_partial_sum: Option<f64>,
    amp_variance: f64,
}

impl CsiProcessor {
    pub fn new(config: &CsiConfig) -> Self {
        Self {
            amplitudes: SampleQueue::with_capacity(config.monitor_queue_limit),
            amp_subcarriers: resolve_slices(&config.amp_subcarrier_slices),
            heat_subcarriers: resolve_slices(&config.heat_subcarrier_slices),
            heat_window: config.heat_signal_window,
            diff_threshold: config.heat_diff_threshold,
            penalty: config.heat_penalty_factor,
            pred_window: config.pred_signal_window,
            lowpass: LowPassFilter::new(config.lowpass_cutoff, config.lowpass_sample_rate),
            shrink_threshold: config.shrink_threshold,
            shrink_floor: config.shrink_floor,
            shrink_decay: config.shrink_decay,
            partial_sum_width: config.partial_sum_width,
            prev_partial_sum: None,
            amp_variance: 0.0,
        }
    }

    /// Amplitude and phase for each interleaved I/Q pair.
    pub fn amplitudes_phases(raw_csi: &[i32]) -> (Vec<f64>, Vec<f64>) {
        let mut amplitudes = Vec::with_capacity(raw_csi.len() / 2);
        let mut phases = Vec::with_capacity(raw_csi.len() / 2);
        for pair in raw_csi.chunks_exact(2) {
            let sample = Complex::new(pair[0] as f64, pair[1] as f64);
            amplitudes.push(sample.norm());
            phases.push(sample.arg());
        }
        (amplitudes, phases)
    }

    /// Converts one frame's raw CSI to an amplitude sample and queues it.
    pub fn ingest(&mut self, raw_csi: &[i32]) {
        if raw_csi.is_empty() {
            return;
        }
        let (amplitudes, _phases) = Self::amplitudes_phases(raw_csi);
        let restricted: Vec<f64> = self
            .amp_subcarriers
            .iter()
            .filter(|&&idx| idx < amplitudes.len())
            .map(|&idx| amplitudes[idx])
            .collect();
        self.amplitudes.push(restricted);
    }

    /// Contrast-enhanced heatmap row for the latest sample.
    ///
    /// Small jitter around the window mean is suppressed, sustained
    /// deviation is exaggerated. With insufficient history the latest
    /// sample is returned unmodified (restricted to the heatmap set).
    pub fn heatmap(&mut self) -> Vec<f64> {
        if self.amplitudes.len() < self.heat_window {
            return match self.amplitudes.latest() {
                Some(latest) => select(latest, &self.heat_subcarriers),
                None => Vec::new(),
            };
        }

        let diff = match self.windowed_diff() {
            Some(diff) => diff,
            None => return Vec::new(),
        };
        Self::apply_penalty(&diff, self.diff_threshold, self.penalty)
    }

    /// Variance of the latest window diff, rounded to one decimal.
    /// 0.0 until enough history has accumulated.
    pub fn amplitude_variance(&mut self) -> f64 {
        if self.amplitudes.len() < self.heat_window {
            return 0.0;
        }
        self.windowed_diff();
        (self.amp_variance * 10.0).round() / 10.0
    }

    /// Latest sample minus the per-subcarrier window mean, over the
    /// heatmap subcarrier set. Records the diff variance as a side effect.
    ///
    /// Samples in the window can differ in length when the device mixes
    /// CSI payload sizes; only subcarriers present in every sample are
    /// compared.
    fn windowed_diff(&mut self) -> Option<Vec<f64>> {
        let window = self.amplitudes.window(self.heat_window);
        let latest = *window.last()?;
        let shortest = window.iter().map(|sample| sample.len()).min()?;

        let mut diff = Vec::with_capacity(self.heat_subcarriers.len());
        for &idx in &self.heat_subcarriers {
            if idx >= shortest {
                continue;
            }
            let mean = window.iter().map(|sample| sample[idx]).sum::<f64>() / window.len() as f64;
            diff.push(latest[idx] - mean);
        }
        self.amp_variance = StatsHelper::variance(&diff);
        Some(diff)
    }

    /// Zero out diffs below the threshold; amplify the rest, keeping the
    /// sign of the deviation.
    fn apply_penalty(diff: &[f64], threshold: f64, penalty: f64) -> Vec<f64> {
        diff.iter()
            .map(|&d| {
                if d.abs() < threshold {
                    0.0
                } else {
                    d.signum() * d.abs().powf(penalty)
                }
            })
            .collect()
    }

    /// Denoised feature vector for the presence model: the shrunk mean
    /// of the low-pass-filtered window, plus the change in the leading
    /// partial amplitude sum since the previous call.
    pub fn feature_window(&mut self) -> Vec<f64> {
        let window = self.amplitudes.window(self.pred_window);
        if window.is_empty() {
            return Vec::new();
        }
        // Mixed CSI payload sizes yield mixed sample lengths; use the
        // subcarriers present in every sample.
        let subcarriers = window.iter().map(|sample| sample.len()).min().unwrap_or(0);
        let packets = window.len();

        // Low-pass each subcarrier across the time axis.
        let mut filtered = Array2::<f64>::zeros((packets, subcarriers));
        for sub in 0..subcarriers {
            let series: Vec<f64> = window.iter().map(|sample| sample[sub]).collect();
            for (row, value) in self.lowpass.smooth(&series).into_iter().enumerate() {
                filtered[[row, sub]] = value;
            }
        }

        let mean = filtered
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(subcarriers));

        // Pull outlier packets toward the mean: full weight inside the
        // distance threshold, exponential decay toward a floor outside.
        let mut shrunk = Array1::<f64>::zeros(subcarriers);
        for row in filtered.axis_iter(Axis(0)) {
            let distance = row
                .iter()
                .zip(mean.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            let factor = if distance <= self.shrink_threshold {
                1.0
            } else {
                self.shrink_floor
                    + (1.0 - self.shrink_floor)
                        * (-self.shrink_decay * (distance - self.shrink_threshold)).exp()
            };
            for (idx, (&value, &m)) in row.iter().zip(mean.iter()).enumerate() {
                shrunk[idx] += m + factor * (value - m);
            }
        }
        shrunk /= packets as f64;

        let mut features: Vec<f64> = shrunk.to_vec();
        let partial_sum: f64 = features
            .iter()
            .take(self.partial_sum_width)
            .sum();
        let delta = match self.prev_partial_sum {
            Some(prev) => (partial_sum - prev).abs(),
            None => 0.0,
        };
        self.prev_partial_sum = Some(partial_sum);
        features.push(delta);
        features
    }

    pub fn queue_len(&self) -> usize {
        self.amplitudes.len()
    }

    /// Monitoring and recording use different queue bounds.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.amplitudes.set_capacity(capacity);
    }

    pub fn clear(&mut self) {
        self.amplitudes.clear();
        self.prev_partial_sum = None;
        self.amp_variance = 0.0;
    }
}

fn resolve_slices(slices: &[(usize, usize)]) -> Vec<usize> {
    let mut indices = Vec::new();
    for &(start, end) in slices {
        indices.extend(start..end);
    }
    indices
}

fn select(sample: &[f64], indices: &[usize]) -> Vec<f64> {
    indices
        .iter()
        .filter(|&&idx| idx < sample.len())
        .map(|&idx| sample[idx])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CsiConfig;

    fn small_config() -> CsiConfig {
        CsiConfig {
            monitor_queue_limit: 16,
            amp_subcarrier_slices: vec![(0, 4)],
            heat_subcarrier_slices: vec![(0, 4)],
            heat_signal_window: 3,
            heat_diff_threshold: 5.0,
            heat_penalty_factor: 1.0,
            pred_signal_window: 3,
            partial_sum_width: 2,
            ..CsiConfig::default()
        }
    }

    #[test]
    fn amplitude_and_phase_from_iq_pairs() {
        let (amps, phases) = CsiProcessor::amplitudes_phases(&[3, 4, 0, 5]);
        assert_eq!(amps, vec![5.0, 5.0]);
        assert!((phases[0] - (4.0f64).atan2(3.0)).abs() < 1e-12);
        assert!((phases[1] - (5.0f64).atan2(0.0)).abs() < 1e-12);
    }

    #[test]
    fn penalty_zeroes_small_diffs_and_keeps_sign() {
        let out = CsiProcessor::apply_penalty(&[2.0, -6.0, 4.0, 9.0], 5.0, 1.0);
        assert_eq!(out, vec![0.0, -6.0, 0.0, 9.0]);
    }

    #[test]
    fn penalty_exponent_amplifies() {
        let out = CsiProcessor::apply_penalty(&[-3.0, 4.0], 2.0, 2.0);
        assert_eq!(out, vec![-9.0, 16.0]);
    }

    #[test]
    fn heatmap_falls_back_to_latest_sample_without_history() {
        let mut processor = CsiProcessor::new(&small_config());
        processor.ingest(&[3, 4, 0, 5, 1, 0, 0, 1]);
        let row = processor.heatmap();
        assert_eq!(row, vec![5.0, 5.0, 1.0, 1.0]);
        assert_eq!(processor.amplitude_variance(), 0.0);
    }

    #[test]
    fn heatmap_suppresses_steady_signal() {
        let mut processor = CsiProcessor::new(&small_config());
        for _ in 0..4 {
            processor.ingest(&[3, 4, 0, 5, 1, 0, 0, 1]);
        }
        // Latest equals the window mean, so every diff is below threshold.
        assert_eq!(processor.heatmap(), vec![0.0; 4]);
        assert_eq!(processor.amplitude_variance(), 0.0);
    }

    #[test]
    fn feature_window_appends_partial_sum_delta() {
        let mut processor = CsiProcessor::new(&small_config());
        for _ in 0..3 {
            processor.ingest(&[3, 4, 0, 5, 1, 0, 0, 1]);
        }
        let first = processor.feature_window();
        // Four subcarriers plus the delta feature.
        assert_eq!(first.len(), 5);
        assert_eq!(*first.last().unwrap(), 0.0);

        // A stable signal produces a near-zero delta on the next call.
        processor.ingest(&[3, 4, 0, 5, 1, 0, 0, 1]);
        let second = processor.feature_window();
        assert!(second.last().unwrap().abs() < 1e-9);
    }

    #[test]
    fn mixed_length_samples_clamp_the_heatmap_window() {
        // Devices that alternate CSI payload sizes store samples of
        // different lengths in one window.
        let mut processor = CsiProcessor::new(&CsiConfig {
            amp_subcarrier_slices: vec![(0, 6)],
            heat_subcarrier_slices: vec![(0, 6)],
            heat_signal_window: 2,
            ..small_config()
        });
        processor.ingest(&[3, 4, 0, 5, 1, 0, 0, 1]); // 4 amplitudes
        processor.ingest(&[3, 4, 0, 5, 1, 0, 0, 1, 2, 0, 0, 2]); // 6 amplitudes

        let row = processor.heatmap();
        // Only the subcarriers present in every sample are compared.
        assert_eq!(row.len(), 4);
        assert_eq!(processor.amplitude_variance(), 0.0);
    }

    #[test]
    fn mixed_length_samples_clamp_the_feature_window() {
        let mut processor = CsiProcessor::new(&CsiConfig {
            amp_subcarrier_slices: vec![(0, 6)],
            heat_subcarrier_slices: vec![(0, 6)],
            pred_signal_window: 3,
            ..small_config()
        });
        processor.ingest(&[3, 4, 0, 5, 1, 0, 0, 1, 2, 0, 0, 2]);
        processor.ingest(&[3, 4, 0, 5, 1, 0, 0, 1]);
        processor.ingest(&[3, 4, 0, 5, 1, 0, 0, 1, 2, 0, 0, 2]);

        let features = processor.feature_window();
        // Four shared subcarriers plus the delta feature.
        assert_eq!(features.len(), 5);
    }

    #[test]
    fn clear_resets_state() {
        let mut processor = CsiProcessor::new(&small_config());
        for _ in 0..3 {
            processor.ingest(&[3, 4, 0, 5, 1, 0, 0, 1]);
        }
        processor.feature_window();
        processor.clear();
        assert_eq!(processor.queue_len(), 0);
        assert!(processor.heatmap().is_empty());
        // Clearing twice is a no-op.
        processor.clear();
        assert_eq!(processor.queue_len(), 0);
    }
}
