//! Recording sink: one CSV row per accepted frame while recording.

use log::{error, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Buffered, thread-safe row sink consumed by the routing worker.
pub trait RecordSink: Send + Sync {
    fn write(&self, row: &[String]) -> bool;
}

/// Column headers for a given Doppler row count. Label columns first,
/// then transmit/receive metadata, then the sensor payloads.
pub fn csv_columns(doppler_rows: usize) -> Vec<String> {
    let mut columns: Vec<String> = [
        "Presence",
        "Target_Count",
        "State",
        "Activity",
        "Angle",
        "Distance",
        "Obstructed",
        "Obstruction",
        "Spacing",
        "Transmit_Timestamp",
        "Received_Timestamp",
        "RSSI",
        "Bandwidth",
        "Channel",
        "Antenna",
        "Raw_CSI",
        "Radar_Targets",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    for row in 1..=doppler_rows {
        columns.push(format!("Doppler_{row}"));
    }
    columns
}

/// Appends rows to a `PREFIX###.csv` file, numbered after the highest
/// existing capture in the directory.
pub struct CsvRecorder {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl CsvRecorder {
    pub fn create(directory: &Path, prefix: &str, columns: &[String]) -> std::io::Result<Self> {
        fs::create_dir_all(directory)?;
        let path = next_free_path(directory, prefix)?;

        let file = OpenOptions::new().create_new(true).write(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", columns.join(","))?;

        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&self) -> std::io::Result<()> {
        match self.writer.lock() {
            Ok(mut writer) => writer.flush(),
            Err(poisoned) => poisoned.into_inner().flush(),
        }
    }

    /// Doppler rows for one frame as CSV cells, one row per cell with
    /// the gates space-joined inside it.
    pub fn doppler_cells(matrix: &ndarray::Array2<f64>) -> Vec<String> {
        matrix
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .map(|v| format!("{}", *v as i64))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }
}

impl RecordSink for CsvRecorder {
    fn write(&self, row: &[String]) -> bool {
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        match writeln!(writer, "{}", row.join(",")) {
            Ok(()) => true,
            Err(err) => {
                error!("writing record row: {err}");
                false
            }
        }
    }
}

impl Drop for CsvRecorder {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!("flushing recorder on close: {err}");
        }
    }
}

fn next_free_path(directory: &Path, prefix: &str) -> std::io::Result<PathBuf> {
    let mut highest = 0u32;
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix(prefix) {
            if let Some(number) = rest.strip_suffix(".csv").and_then(|n| n.parse::<u32>().ok()) {
                highest = highest.max(number);
            }
        }
    }
    Ok(directory.join(format!("{prefix}{:03}.csv", highest + 1)))
}
