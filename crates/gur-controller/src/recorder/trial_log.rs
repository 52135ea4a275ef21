//! Append-only CSV trial log
//!
//! Every append opens the file, writes one row, flushes and syncs, then
//! closes it, so an abrupt exit never leaves a half-written row behind.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use gur_common::{GurError, Result, TrialRecord, TRIAL_LOG_COLUMNS, TRIAL_LOG_SCHEMA_VERSION};
use tracing::{debug, warn};

/// Durable trial log at a fixed path
#[derive(Debug, Clone)]
pub struct TrialLog {
    path: PathBuf,
}

impl TrialLog {
    /// Bind to `path` and warn if an existing header differs from the
    /// current schema. The file itself is created lazily on first append.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let log = Self { path: path.into() };
        log.check_header();
        log
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `max(trial_id) + 1` over all rows, or 1 when the log is absent or
    /// empty. Rows whose first field is not an integer (the header, damaged
    /// lines) are skipped. A maximum id of `u64::MAX` is a storage error
    /// rather than a wrap back to 0.
    pub fn next_trial_id(&self) -> Result<u64> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(1),
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let max = reader
            .records()
            .filter_map(|row| row.ok())
            .filter_map(|row| row.get(0).and_then(|id| id.trim().parse::<u64>().ok()))
            .max();

        match max {
            None => Ok(1),
            Some(id) => id.checked_add(1).ok_or_else(|| {
                GurError::Storage(format!(
                    "trial id {id} in {} cannot be incremented",
                    self.path.display()
                ))
            }),
        }
    }

    /// Append one record, writing the header first if the file is new or empty
    pub fn append(&self, record: &TrialRecord) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(TRIAL_LOG_COLUMNS).map_err(storage)?;
            debug!(path = %self.path.display(), "Wrote trial log header");
        }
        writer.write_record(record.to_row()).map_err(storage)?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| GurError::Storage(e.to_string()))?;
        file.sync_data()?;
        Ok(())
    }

    fn check_header(&self) {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(_) => return,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        if let Some(Ok(first)) = reader.records().next() {
            if !first.iter().eq(TRIAL_LOG_COLUMNS.iter().copied()) {
                warn!(
                    path = %self.path.display(),
                    schema_version = TRIAL_LOG_SCHEMA_VERSION,
                    found = ?first,
                    "Trial log header differs from current schema; appending anyway"
                );
            }
        }
    }
}

fn storage(err: csv::Error) -> GurError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => e.into(),
        other => GurError::Storage(format!("{other:?}")),
    }
}

/// Convenience for callers that only hold a path
pub fn next_trial_id(path: impl AsRef<Path>) -> Result<u64> {
    TrialLog {
        path: path.as_ref().to_path_buf(),
    }
    .next_trial_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gur_common::{Action, TelemetryFrame, UNAVAILABLE_MARKER};
    use std::io::Write;
    use tempfile::tempdir;

    fn record(trial_id: u64, node: Option<TelemetryFrame>) -> TrialRecord {
        TrialRecord {
            trial_id,
            sim_time_seconds: 1.0,
            participant_id: "node-a".into(),
            frame_counter: Some(1),
            window_count: 1,
            target: 10,
            satisfaction: 20.0,
            overload: false,
            active_participants: 1,
            node,
        }
    }

    #[test]
    fn test_absent_log_starts_at_one() {
        let dir = tempdir().unwrap();
        assert_eq!(next_trial_id(dir.path().join("missing.csv")).unwrap(), 1);
    }

    #[test]
    fn test_empty_log_starts_at_one() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        File::create(&path).unwrap();
        assert_eq!(next_trial_id(&path).unwrap(), 1);
    }

    #[test]
    fn test_recovers_max_plus_one() {
        let dir = tempdir().unwrap();
        let log = TrialLog::open(dir.path().join("trials.csv"));
        for id in [1, 1, 2, 2, 3] {
            log.append(&record(id, None)).unwrap();
        }
        assert_eq!(log.next_trial_id().unwrap(), 4);
    }

    #[test]
    fn test_skips_unparseable_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trials.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "trial_id,sim_time_seconds").unwrap();
        writeln!(file, "7,1.0").unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, "2,5.0,extra,columns").unwrap();
        drop(file);

        assert_eq!(next_trial_id(&path).unwrap(), 8);
    }

    #[test]
    fn test_exhausted_trial_id_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trials.csv");
        std::fs::write(&path, format!("trial_id\n{},1\n3,1\n", u64::MAX)).unwrap();

        let err = next_trial_id(&path).unwrap_err();
        assert!(matches!(err, GurError::Storage(_)));
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trials.csv");
        let log = TrialLog::open(&path);
        log.append(&record(1, None)).unwrap();
        log.append(&record(1, None)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], TRIAL_LOG_COLUMNS.join(","));
        assert_eq!(contents.matches("trial_id").count(), 1);
    }

    #[test]
    fn test_reopen_appends_without_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trials.csv");
        TrialLog::open(&path).append(&record(1, None)).unwrap();
        TrialLog::open(&path).append(&record(2, None)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert_eq!(next_trial_id(&path).unwrap(), 3);
    }

    #[test]
    fn test_row_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trials.csv");
        let log = TrialLog::open(&path);
        log.append(&record(
            4,
            Some(TelemetryFrame {
                node_id: 5,
                state: 2,
                last_satisfaction: 80,
                reward_probability_pct: 60,
                action: Action::Reward,
                period_seconds: 300,
            }),
        ))
        .unwrap();
        log.append(&record(4, None)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines[1].starts_with("4,1.000,node-a,5,1,"));
        assert!(lines[1].contains("REWARD"));
        assert!(lines[2].contains(UNAVAILABLE_MARKER));
    }
}
