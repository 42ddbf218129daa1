//! Doppler-range map processing: clustering noisy range-gate energies
//! into a smoothed distance estimate with absence hysteresis, plus the
//! cell-thresholded map used for visualization.

use crate::config::RdmConfig;
use crate::processing::queue::SampleQueue;
use ndarray::Array2;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum RdmThresholdError {
    #[error("reading threshold file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing threshold file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a {rows}x{gates} threshold matrix")]
    Shape { rows: usize, gates: usize },
}

/// Loads the per-cell visualization threshold matrix from JSON
/// (a nested array of numbers, rows x gates).
pub fn viz_thresholds_from_json(
    path: &Path,
    rows: usize,
    gates: usize,
) -> Result<Array2<f64>, RdmThresholdError> {
    let contents = std::fs::read_to_string(path)?;
    let nested: Vec<Vec<f64>> = serde_json::from_str(&contents)?;
    if nested.len() != rows || nested.iter().any(|row| row.len() != gates) {
        return Err(RdmThresholdError::Shape { rows, gates });
    }
    let flat: Vec<f64> = nested.into_iter().flatten().collect();
    Array2::from_shape_vec((rows, gates), flat).map_err(|_| RdmThresholdError::Shape { rows, gates })
}

pub struct RdmEstimator {
    queue: SampleQueue<Array2<f64>>,
    history: SampleQueue<f64>,
    gate_thresholds: Vec<f64>,
    viz_thresholds: Option<Array2<f64>>,
    energy_row: usize,
    gate_distance: f64,
    absence_tolerance: u32,
    alpha: f64,
    heatmap_max_scaler: f64,
    last_nonzero_distance: Option<f64>,
    target_distance: f64,
    absence_counter: u32,
}

impl RdmEstimator {
    pub fn new(config: &RdmConfig) -> Self {
        Self {
            queue: SampleQueue::with_capacity(config.mmwave_queue_limit),
            history: SampleQueue::with_capacity(config.mmwave_queue_limit),
            gate_thresholds: config.gate_thresholds.clone(),
            viz_thresholds: None,
            energy_row: config.energy_row,
            gate_distance: config.gate_distance,
            absence_tolerance: config.absence_tolerance,
            alpha: config.smoothing_alpha,
            heatmap_max_scaler: config.heatmap_max_scaler,
            last_nonzero_distance: None,
            target_distance: 0.0,
            absence_counter: 0,
        }
    }

    pub fn set_viz_thresholds(&mut self, thresholds: Array2<f64>) {
        self.viz_thresholds = Some(thresholds);
    }

    /// Queues a valid Doppler matrix and refreshes the distance estimate.
    pub fn ingest(&mut self, matrix: Array2<f64>) {
        self.queue.push(matrix);
        self.estimate_distance();
    }

    /// Current smoothed distance, rounded to one decimal.
    pub fn current_distance(&self) -> f64 {
        round1(self.target_distance)
    }

    /// One estimation step over the latest queued matrix.
    pub fn estimate_distance(&mut self) -> f64 {
        let energies: Vec<f64> = match self.queue.latest() {
            Some(matrix) if self.energy_row < matrix.nrows() => {
                matrix.row(self.energy_row).to_vec()
            }
            _ => return 0.0,
        };
        if energies.is_empty() {
            return 0.0;
        }

        let active: Vec<usize> = energies
            .iter()
            .enumerate()
            .filter(|&(gate, &energy)| {
                energy >= self.gate_thresholds.get(gate).copied().unwrap_or(f64::MAX)
            })
            .map(|(gate, _)| gate)
            .collect();

        if let Some((start, end)) = best_cluster(&active, &energies) {
            // Gate-center convention: the cluster midpoint plus half a gate.
            let center_index = (start + end) as f64 / 2.0 + 0.5;
            let raw_distance = center_index * self.gate_distance;
            self.target_distance = match self.last_nonzero_distance {
                Some(last) if last != 0.0 => self.alpha * raw_distance + (1.0 - self.alpha) * last,
                _ => raw_distance,
            };
            self.last_nonzero_distance = Some(raw_distance);
            self.absence_counter = 0;
        } else {
            self.absence_counter += 1;
            match self.last_nonzero_distance {
                // Transient fade: hold the last reading within tolerance.
                Some(last) if self.absence_counter <= self.absence_tolerance => {
                    self.target_distance = last;
                }
                _ => {
                    self.last_nonzero_distance = None;
                    self.target_distance = 0.0;
                }
            }
        }

        self.history.push(self.target_distance);
        round1(self.target_distance)
    }

    /// Latest matrix thresholded per cell for the visualization bridge:
    /// `(doppler_row, gate, scaled_energy)` triples.
    pub fn filtered_map(&self) -> Vec<(usize, usize, f64)> {
        let matrix = match self.queue.latest() {
            Some(matrix) => matrix,
            None => return Vec::new(),
        };

        let mut cells = Vec::with_capacity(matrix.len());
        for ((row, gate), &value) in matrix.indexed_iter() {
            let threshold = self
                .viz_thresholds
                .as_ref()
                .and_then(|t| t.get((row, gate)).copied())
                .unwrap_or_else(|| self.gate_thresholds.get(gate).copied().unwrap_or(0.0));
            let scaled = if value <= threshold {
                0.0
            } else {
                value / self.heatmap_max_scaler
            };
            cells.push((row, gate, scaled));
        }
        cells
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Resets all per-session state; idempotent.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.history.clear();
        self.last_nonzero_distance = None;
        self.target_distance = 0.0;
        self.absence_counter = 0;
    }
}

/// Widest maximal contiguous run of active gates; summed energy breaks
/// ties. A single gate is a valid cluster.
fn best_cluster(active: &[usize], energies: &[f64]) -> Option<(usize, usize)> {
    let mut clusters = Vec::new();
    let mut run: Option<(usize, usize)> = None;
    for &gate in active {
        run = match run {
            Some((start, end)) if gate == end + 1 => Some((start, gate)),
            Some(done) => {
                clusters.push(done);
                Some((gate, gate))
            }
            None => Some((gate, gate)),
        };
    }
    clusters.extend(run);

    // Earliest cluster wins an exact width-and-energy tie, so only a
    // strictly better candidate displaces the current best.
    let mut best: Option<(usize, usize)> = None;
    for (start, end) in clusters {
        let replace = match best {
            None => true,
            Some((best_start, best_end)) => {
                let width = end - start;
                let best_width = best_end - best_start;
                let sum: f64 = energies[start..=end].iter().sum();
                let best_sum: f64 = energies[best_start..=best_end].iter().sum();
                width > best_width || (width == best_width && sum > best_sum)
            }
        };
        if replace {
            best = Some((start, end));
        }
    }
    best
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RdmConfig;
    use ndarray::Array2;

    fn config() -> RdmConfig {
        RdmConfig {
            mmwave_queue_limit: 8,
            doppler_rows: 4,
            range_gates: 16,
            energy_row: 0,
            gate_distance: 1.0,
            absence_tolerance: 6,
            smoothing_alpha: 0.6,
            gate_thresholds: vec![10.0; 16],
            ..RdmConfig::default()
        }
    }

    fn matrix_with_energy_row(energies: &[f64]) -> Array2<f64> {
        let mut matrix = Array2::zeros((4, 16));
        for (gate, &energy) in energies.iter().enumerate() {
            matrix[[0, gate]] = energy;
        }
        matrix
    }

    #[test]
    fn widest_cluster_wins() {
        let mut estimator = RdmEstimator::new(&config());
        let mut energies = vec![0.0; 16];
        energies[2] = 50.0;
        energies[3] = 60.0;
        energies[6] = 40.0;
        estimator.ingest(matrix_with_energy_row(&energies));

        // Clusters (2,3) width 2 sum 110 and (6,6) width 1 sum 40;
        // center of (2,3) is 3.0 gates.
        assert_eq!(estimator.current_distance(), 3.0);
    }

    #[test]
    fn energy_sum_breaks_width_ties() {
        let energies = vec![
            0.0, 20.0, 0.0, 0.0, 90.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ];
        let active = vec![1, 4];
        assert_eq!(best_cluster(&active, &energies), Some((4, 4)));
    }

    #[test]
    fn exact_tie_keeps_the_nearest_cluster() {
        // Same width, same summed energy: the earlier (nearer) gate run
        // is kept.
        let mut energies = vec![0.0; 16];
        energies[2] = 50.0;
        energies[7] = 50.0;
        let active = vec![2, 7];
        assert_eq!(best_cluster(&active, &energies), Some((2, 2)));
    }

    #[test]
    fn empty_queue_returns_zero_without_state_change() {
        let mut estimator = RdmEstimator::new(&config());
        assert_eq!(estimator.estimate_distance(), 0.0);
        assert_eq!(estimator.absence_counter, 0);
        assert!(estimator.last_nonzero_distance.is_none());
    }

    #[test]
    fn absence_holds_then_resets() {
        let mut estimator = RdmEstimator::new(&config());
        let mut energies = vec![0.0; 16];
        energies[4] = 50.0;
        estimator.ingest(matrix_with_energy_row(&energies));
        let held = estimator.current_distance();
        assert!(held > 0.0);

        // Six absent frames hold the last nonzero reading.
        let silent = matrix_with_energy_row(&vec![0.0; 16]);
        for _ in 0..6 {
            estimator.ingest(silent.clone());
            assert_eq!(estimator.current_distance(), held);
        }
        // The seventh clears it.
        estimator.ingest(silent.clone());
        assert_eq!(estimator.current_distance(), 0.0);
        assert!(estimator.last_nonzero_distance.is_none());
    }

    #[test]
    fn smoothing_blends_against_last_nonzero() {
        let mut estimator = RdmEstimator::new(&config());
        let mut near = vec![0.0; 16];
        near[1] = 50.0; // center 1.5
        let mut far = vec![0.0; 16];
        far[5] = 50.0; // center 5.5

        estimator.ingest(matrix_with_energy_row(&near));
        assert_eq!(estimator.current_distance(), 1.5);

        estimator.ingest(matrix_with_energy_row(&far));
        // 0.6 * 5.5 + 0.4 * 1.5 = 3.9
        assert_eq!(estimator.current_distance(), 3.9);
    }

    #[test]
    fn filtered_map_thresholds_cells() {
        let mut estimator = RdmEstimator::new(&RdmConfig {
            heatmap_max_scaler: 100.0,
            ..config()
        });
        let mut energies = vec![0.0; 16];
        energies[0] = 5.0; // below threshold
        energies[1] = 50.0; // above
        estimator.ingest(matrix_with_energy_row(&energies));

        let cells = estimator.filtered_map();
        assert_eq!(cells.len(), 4 * 16);
        assert_eq!(cells[0], (0, 0, 0.0));
        assert_eq!(cells[1], (0, 1, 0.5));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut estimator = RdmEstimator::new(&config());
        let mut energies = vec![0.0; 16];
        energies[2] = 50.0;
        estimator.ingest(matrix_with_energy_row(&energies));
        estimator.clear();
        assert_eq!(estimator.queue_len(), 0);
        assert_eq!(estimator.current_distance(), 0.0);
        estimator.clear();
        assert_eq!(estimator.queue_len(), 0);
    }

    #[test]
    fn threshold_file_round_trips() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let rows: Vec<Vec<f64>> = (0..4).map(|_| vec![1.0; 16]).collect();
        write!(file, "{}", serde_json::to_string(&rows).unwrap()).unwrap();

        let matrix = viz_thresholds_from_json(file.path(), 4, 16).unwrap();
        assert_eq!(matrix.shape(), &[4, 16]);

        assert!(matches!(
            viz_thresholds_from_json(file.path(), 5, 16),
            Err(RdmThresholdError::Shape { .. })
        ));
    }
}
