//! export.rs
//! Anomaly trace: persists a run's power records when synchronization never
//! looked right, so odd runs can be inspected after the fact.

use csv::WriterBuilder;
use serde::Serialize;
use std::{fs, fs::OpenOptions, path::Path};

use crate::device::PowerRecord;
use crate::utils::clock::epoch_micros;

/// A run counts as clean when its best latency landed in this band.
const CLEAN_LATENCY_BAND: std::ops::Range<f64> = 0.0..2.0;

#[derive(Debug, Serialize)]
struct RecordRow {
    requested_epoch_us: u64,
    recorded_epoch_us: u64,
    responded_epoch_us: u64,
    duration_s: f64,
    latency_s: f64,
    power_w: f64,
}

impl From<&PowerRecord> for RecordRow {
    fn from(record: &PowerRecord) -> Self {
        Self {
            requested_epoch_us: epoch_micros(record.requested_at),
            recorded_epoch_us: epoch_micros(record.recorded_at),
            responded_epoch_us: epoch_micros(record.responded_at),
            duration_s: record.duration_s(),
            latency_s: record.latency_s(),
            power_w: record.power_w,
        }
    }
}

/// Appends the records to `path` if the run's minimum latency fell outside the
/// clean band. Returns whether anything was written. Creates the parent
/// directory and writes the header only on first use.
pub fn log_anomalous_run(records: &[PowerRecord], path: &Path) -> Result<bool, csv::Error> {
    if records.is_empty() {
        return Ok(false);
    }
    let min_latency = records
        .iter()
        .map(PowerRecord::latency_s)
        .fold(f64::INFINITY, f64::min);
    if CLEAN_LATENCY_BAND.contains(&min_latency) {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let exists = path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = WriterBuilder::new().has_headers(!exists).from_writer(file);
    for record in records {
        writer.serialize(RecordRow::from(record))?;
    }
    writer.flush()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn record(latency_s: f64) -> PowerRecord {
        let responded = UNIX_EPOCH + Duration::from_secs(2_000);
        let recorded = responded - Duration::from_secs_f64(latency_s);
        PowerRecord::new(3.0, recorded, responded - Duration::from_millis(300), responded)
    }

    fn temp_csv(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!("idleplug_{name}_{unique}.csv"));
        path
    }

    #[test]
    fn clean_runs_are_not_persisted() {
        let path = temp_csv("clean");
        let written = log_anomalous_run(&[record(0.5), record(3.0)], &path).unwrap();
        assert!(!written);
        assert!(!path.exists());
    }

    #[test]
    fn anomalous_runs_are_appended_with_one_header() {
        let path = temp_csv("anomalous");
        assert!(log_anomalous_run(&[record(4.0), record(5.0)], &path).unwrap());
        assert!(log_anomalous_run(&[record(6.0)], &path).unwrap());
        let text = fs::read_to_string(&path).unwrap();
        let headers = text
            .lines()
            .filter(|l| l.starts_with("requested_epoch_us"))
            .count();
        assert_eq!(headers, 1);
        assert_eq!(text.lines().count(), 4);
        fs::remove_file(&path).ok();
    }
}
