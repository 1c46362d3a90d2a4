//! Size-rotated durable event log.
//!
//! This module provides the [`RotatingLog`] which appends events, one per
//! line, to an active file and rotates it into numbered backups once it
//! reaches a size threshold.
//!
//! # File Layout
//!
//! ```text
//! logs/stream.log      active file, newest events
//! logs/stream.log.1    most recently rotated file
//! logs/stream.log.2
//! logs/stream.log.3
//! logs/stream.log.4    oldest retained backup (backup_count = 4)
//! ```
//!
//! # Rotation
//!
//! Before every append the active file's size is checked. When it has
//! reached `max_file_size`:
//! 1. The oldest backup (`.{backup_count}`) is discarded
//! 2. Backups shift up by one (`.3` → `.4`, `.2` → `.3`, `.1` → `.2`)
//! 3. The active file becomes `.1`
//! 4. The event is appended to a fresh active file
//!
//! Every append is synced to disk before returning; the log is the source of
//! truth for everything the ingester has accepted.

use crate::error::{Error, Result};
use logstream_core::Event;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration for the rotating log.
#[derive(Debug, Clone)]
pub struct RotatingLogConfig {
    /// Directory holding the active file and its backups.
    /// Default: ./logs
    pub log_dir: PathBuf,

    /// Name of the active file; backups append `.1`, `.2`, ...
    /// Default: "stream.log"
    pub file_name: String,

    /// Size in bytes at which the active file is rotated.
    /// Default: 50 MiB
    pub max_file_size: u64,

    /// Number of rotated backups retained, `.1` through `.{backup_count}`.
    /// Zero discards the active file on rotation.
    /// Default: 4
    pub backup_count: usize,
}

impl Default for RotatingLogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            file_name: "stream.log".to_string(),
            max_file_size: 50 * 1024 * 1024, // 50 MiB
            backup_count: 4,
        }
    }
}

/// Append-only event log with size-triggered rotation.
///
/// Thread-safe: the size check, rotation and append run under one lock.
pub struct RotatingLog {
    config: RotatingLogConfig,
    state: Mutex<LogState>,
}

#[derive(Debug, Default)]
struct LogState {
    events_written: u64,
    bytes_written: u64,
    rotations: u64,
}

impl RotatingLog {
    /// Create a rotating log, creating the log directory if needed.
    ///
    /// Existing files are left untouched; appends continue the active file.
    pub fn new(config: RotatingLogConfig) -> Result<Self> {
        fs::create_dir_all(&config.log_dir)
            .map_err(|e| Error::persistence(&config.log_dir, e))?;

        info!(
            "RotatingLog initialized: dir={}, file={}, max_size={}, backups={}",
            config.log_dir.display(),
            config.file_name,
            config.max_file_size,
            config.backup_count
        );

        Ok(Self {
            config,
            state: Mutex::new(LogState::default()),
        })
    }

    /// Path of the active file.
    pub fn active_path(&self) -> PathBuf {
        self.config.log_dir.join(&self.config.file_name)
    }

    /// Path of backup slot `index` (1 = most recent).
    pub fn backup_path(&self, index: usize) -> PathBuf {
        self.config
            .log_dir
            .join(format!("{}.{}", self.config.file_name, index))
    }

    /// Number of rotated backups retained.
    pub fn max_backups(&self) -> usize {
        self.config.backup_count
    }

    /// Append an event followed by a newline, rotating first if needed.
    ///
    /// Returns `true` if the active file was rotated before the write.
    /// The data is synced to disk before this returns. If the write fails,
    /// the active file is truncated back to its previous length.
    pub fn append(&self, event: &Event) -> Result<bool> {
        let mut state = self.state.lock();
        let path = self.active_path();

        let rotated = match fs::metadata(&path) {
            Ok(meta) if meta.len() >= self.config.max_file_size => {
                self.rotate(&path)?;
                state.rotations += 1;
                true
            }
            Ok(_) => false,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // First write, or the directory was removed underneath us
                fs::create_dir_all(&self.config.log_dir)
                    .map_err(|e| Error::persistence(&self.config.log_dir, e))?;
                false
            }
            Err(e) => return Err(Error::persistence(&path, e)),
        };

        let line = event.to_line();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::persistence(&path, e))?;
        let start_len = file
            .metadata()
            .map_err(|e| Error::persistence(&path, e))?
            .len();

        if let Err(e) = write_durably(&mut file, &line) {
            if let Err(truncate_err) = file.set_len(start_len) {
                warn!(
                    path = %path.display(),
                    error = %truncate_err,
                    "failed to roll back partial append"
                );
            }
            return Err(Error::persistence(&path, e));
        }

        state.events_written += 1;
        state.bytes_written += line.len() as u64;
        metrics::counter!("log_bytes_written_total").increment(line.len() as u64);

        Ok(rotated)
    }

    /// Shift backups up one slot and move the active file into slot 1.
    fn rotate(&self, active: &Path) -> Result<()> {
        let max_backups = self.max_backups();

        if max_backups == 0 {
            fs::remove_file(active).map_err(|e| Error::persistence(active, e))?;
            info!("Discarded {} (no backups retained)", active.display());
            metrics::counter!("log_rotations_total").increment(1);
            return Ok(());
        }

        let oldest = self.backup_path(max_backups);
        match fs::remove_file(&oldest) {
            Ok(()) => debug!("Discarded oldest backup {}", oldest.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::persistence(&oldest, e)),
        }

        for index in (1..max_backups).rev() {
            let from = self.backup_path(index);
            match fs::rename(&from, self.backup_path(index + 1)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::persistence(&from, e)),
            }
        }

        let first = self.backup_path(1);
        fs::rename(active, &first).map_err(|e| Error::persistence(active, e))?;

        info!("Rotated {} -> {}", active.display(), first.display());
        metrics::counter!("log_rotations_total").increment(1);
        Ok(())
    }

    /// Get statistics about the log.
    pub fn stats(&self) -> RotatingLogStats {
        let state = self.state.lock();
        let active_file_bytes = fs::metadata(self.active_path())
            .map(|m| m.len())
            .unwrap_or(0);

        RotatingLogStats {
            events_written: state.events_written,
            bytes_written: state.bytes_written,
            rotations: state.rotations,
            active_file_bytes,
        }
    }
}

fn write_durably(file: &mut File, line: &[u8]) -> io::Result<()> {
    file.write_all(line)?;
    file.sync_data()
}

/// Statistics about the rotating log.
#[derive(Debug, Clone, Default)]
pub struct RotatingLogStats {
    /// Events appended since creation.
    pub events_written: u64,

    /// Bytes appended since creation, newlines included.
    pub bytes_written: u64,

    /// Rotations performed since creation.
    pub rotations: u64,

    /// Current size of the active file.
    pub active_file_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(text: &str) -> Event {
        Event::from_text(text).unwrap()
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn log_in(tmp: &TempDir, max_file_size: u64, backup_count: usize) -> RotatingLog {
        RotatingLog::new(RotatingLogConfig {
            log_dir: tmp.path().join("logs"),
            max_file_size,
            backup_count,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_append_single_event() {
        let tmp = TempDir::new().unwrap();
        let log = log_in(&tmp, 1024, 4);

        assert!(!log.append(&event("hello")).unwrap());

        assert_eq!(fs::read_to_string(log.active_path()).unwrap(), "hello\n");
        let stats = log.stats();
        assert_eq!(stats.events_written, 1);
        assert_eq!(stats.bytes_written, 6);
        assert_eq!(stats.active_file_bytes, 6);
    }

    #[test]
    fn test_recreates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let log = log_in(&tmp, 1024, 4);
        fs::remove_dir_all(tmp.path().join("logs")).unwrap();

        log.append(&event("after-removal")).unwrap();
        assert_eq!(read_lines(&log.active_path()), vec!["after-removal"]);
    }

    #[test]
    fn test_continues_existing_active_file() {
        let tmp = TempDir::new().unwrap();
        {
            let log = log_in(&tmp, 1024, 4);
            log.append(&event("first-run")).unwrap();
        }
        let log = log_in(&tmp, 1024, 4);
        log.append(&event("second-run")).unwrap();
        assert_eq!(
            read_lines(&log.active_path()),
            vec!["first-run", "second-run"]
        );
    }

    #[test]
    fn test_two_rotations_with_small_threshold() {
        let tmp = TempDir::new().unwrap();
        let log = log_in(&tmp, 10, 4);

        // Each line is 5 bytes; two lines reach the threshold
        let rotations: Vec<bool> = ["aaaa", "bbbb", "cccc", "dddd", "eeee"]
            .iter()
            .map(|text| log.append(&event(text)).unwrap())
            .collect();
        assert_eq!(rotations, vec![false, false, true, false, true]);

        assert_eq!(read_lines(&log.backup_path(2)), vec!["aaaa", "bbbb"]);
        assert_eq!(read_lines(&log.backup_path(1)), vec!["cccc", "dddd"]);
        assert_eq!(read_lines(&log.active_path()), vec!["eeee"]);
        assert!(!log.backup_path(3).exists());
        assert_eq!(log.stats().rotations, 2);
    }

    #[test]
    fn test_active_file_never_exceeds_threshold() {
        let tmp = TempDir::new().unwrap();
        let log = log_in(&tmp, 32, 3);

        for i in 0..100 {
            log.append(&event(&format!("evt-{i:03}"))).unwrap();
            assert!(fs::metadata(log.active_path()).unwrap().len() <= 32);
        }
    }

    #[test]
    fn test_oldest_backup_discarded_at_capacity() {
        let tmp = TempDir::new().unwrap();
        let log = log_in(&tmp, 1, 4);

        // Threshold of one byte: every append after the first rotates
        for text in ["e1", "e2", "e3", "e4", "e5", "e6"] {
            log.append(&event(text)).unwrap();
        }

        assert_eq!(log.max_backups(), 4);
        assert_eq!(read_lines(&log.active_path()), vec!["e6"]);
        assert_eq!(read_lines(&log.backup_path(1)), vec!["e5"]);
        assert_eq!(read_lines(&log.backup_path(2)), vec!["e4"]);
        assert_eq!(read_lines(&log.backup_path(3)), vec!["e3"]);
        assert_eq!(read_lines(&log.backup_path(4)), vec!["e2"]);
        assert!(!log.backup_path(5).exists());
        assert_eq!(log.stats().rotations, 5);
    }

    #[test]
    fn test_rotation_preserves_receipt_order() {
        let tmp = TempDir::new().unwrap();
        let log = log_in(&tmp, 40, 16);

        let events: Vec<String> = (0..30).map(|i| format!("event-{i:02}")).collect();
        for text in &events {
            log.append(&event(text)).unwrap();
        }

        // Concatenate oldest backup to newest, then the active file
        let mut replayed = Vec::new();
        for index in (1..=log.max_backups()).rev() {
            let path = log.backup_path(index);
            if path.exists() {
                replayed.extend(read_lines(&path));
            }
        }
        replayed.extend(read_lines(&log.active_path()));

        assert_eq!(replayed, events);
    }

    #[test]
    fn test_single_backup_is_replaced_each_rotation() {
        let tmp = TempDir::new().unwrap();
        let log = log_in(&tmp, 5, 1);

        for text in ["aaaa", "bbbb", "cccc"] {
            log.append(&event(text)).unwrap();
        }

        assert_eq!(read_lines(&log.active_path()), vec!["cccc"]);
        assert_eq!(read_lines(&log.backup_path(1)), vec!["bbbb"]);
        assert!(!log.backup_path(2).exists());
    }

    #[test]
    fn test_zero_backups_discards_active_file() {
        let tmp = TempDir::new().unwrap();
        let log = log_in(&tmp, 5, 0);

        log.append(&event("aaaa")).unwrap();
        assert!(log.append(&event("bbbb")).unwrap());

        assert_eq!(read_lines(&log.active_path()), vec!["bbbb"]);
        assert!(!log.backup_path(1).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_append_error_is_surfaced() {
        let tmp = TempDir::new().unwrap();
        let log = log_in(&tmp, 1024, 4);

        // A regular file where the log directory should be
        let dir = tmp.path().join("logs");
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, b"not a directory").unwrap();

        let err = log.append(&event("lost")).unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
        assert_eq!(log.stats().events_written, 0);
    }
}
