//! Append-only audit trail of dispatched scans.
//!
//! One JSON object per line. The code itself is never written, only its
//! redacted hint.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// One dispatched scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Time-ordered record id.
    pub id: Uuid,
    /// First characters and length of the scanned code.
    pub code_hint: String,
    /// When the scan was dispatched.
    pub scanned_at: DateTime<Utc>,
    /// Local calendar date, e.g. `15-Jan-2025`.
    pub local_date: String,
    /// Local wall-clock time, e.g. `09:30:12`.
    pub local_time: String,
    pub is_valid: bool,
    /// Outcome reason, or `dispatch_failed`.
    pub reason: String,
}

impl AuditRecord {
    /// Build a record stamped with `scanned_at` rendered in `tz`.
    pub fn new(code: &str, scanned_at: DateTime<Utc>, tz: Tz, is_valid: bool, reason: &str) -> Self {
        let local = scanned_at.with_timezone(&tz);
        Self {
            id: Uuid::now_v7(),
            code_hint: turnstile_core::code_hint(code),
            scanned_at,
            local_date: local.format("%d-%b-%Y").to_string(),
            local_time: local.format("%H:%M:%S").to_string(),
            is_valid,
            reason: reason.to_string(),
        }
    }
}

/// Appends [`AuditRecord`]s to a JSON-lines file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Log to `path`. The file and its parent directory are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T17:30:12Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_record_renders_local_time_and_redacts_code() {
        let record = AuditRecord::new("ABC123", at(), chrono_tz::America::Los_Angeles, true, "accepted");
        assert_eq!(record.local_date, "15-Jan-2025");
        assert_eq!(record.local_time, "09:30:12");
        assert_eq!(record.code_hint, "ABC…(6)");
        assert_eq!(record.id.get_version_num(), 7);
    }

    #[tokio::test]
    async fn test_append_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("nested").join("audit.jsonl"));

        let first = AuditRecord::new("ABC123", at(), chrono_tz::UTC, true, "accepted");
        let second = AuditRecord::new("OLD999", at(), chrono_tz::UTC, false, "expired");
        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(!text.contains("ABC123"));

        let parsed: AuditRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed, second);
    }
}
