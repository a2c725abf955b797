//! Durable attendance ledger and student directory, backed by SQLite.
//!
//! Presence rows carry a precomputed time bucket and a
//! `UNIQUE(name, date, bucket)` constraint, so the per-period dedup rule
//! is enforced by the store itself: a concurrent duplicate insert
//! collapses into an idempotent no-op instead of a second row.

use std::path::Path;
use std::sync::Mutex;

use chrono::{NaiveDateTime, Timelike};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::Result;

const SECONDS_PER_DAY: u32 = 86_400;

/// One persisted presence event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRow {
    pub name: String,
    pub date: String,
    pub time: String,
}

/// Directory entry carried alongside enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentRow {
    pub name: String,
    pub details: String,
}

/// Per-identity attendance summary over distinct class dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub name: String,
    pub present: u32,
    pub total: u32,
    pub percentage: f64,
}

pub struct Ledger {
    conn: Mutex<Connection>,
    bucket_secs: u32,
}

impl Ledger {
    /// Open (creating if needed) the ledger database at `path`.
    ///
    /// `bucket_secs` is the dedup granularity: 60 gives at most one row
    /// per identity per minute, 86400 one per day.
    pub fn open(path: impl AsRef<Path>, bucket_secs: u32) -> Result<Self> {
        Self::from_connection(Connection::open(path)?, bucket_secs)
    }

    /// In-memory ledger for tests and dry runs.
    pub fn open_in_memory(bucket_secs: u32) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, bucket_secs)
    }

    fn from_connection(conn: Connection, bucket_secs: u32) -> Result<Self> {
        let bucket_secs = if bucket_secs == 0 {
            tracing::warn!("bucket granularity of 0s is invalid, using 1s");
            1
        } else {
            bucket_secs.min(SECONDS_PER_DAY)
        };

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS attendance (
                 id     INTEGER PRIMARY KEY AUTOINCREMENT,
                 name   TEXT NOT NULL,
                 date   TEXT NOT NULL,
                 time   TEXT NOT NULL,
                 bucket INTEGER NOT NULL,
                 UNIQUE (name, date, bucket)
             );
             CREATE TABLE IF NOT EXISTS students (
                 id      INTEGER PRIMARY KEY AUTOINCREMENT,
                 name    TEXT NOT NULL UNIQUE,
                 details TEXT NOT NULL DEFAULT ''
             );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            bucket_secs,
        })
    }

    fn bucket_of(&self, ts: &NaiveDateTime) -> i64 {
        (ts.time().num_seconds_from_midnight() / self.bucket_secs) as i64
    }

    /// Record presence unless a row for (identity, date, bucket) already
    /// exists. Returns whether a row was written; a dedup hit is a
    /// silent no-op, not an error.
    pub fn record_if_new(&self, identity: &str, ts: NaiveDateTime) -> Result<bool> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let written = conn.execute(
            "INSERT OR IGNORE INTO attendance (name, date, time, bucket)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                identity,
                ts.date().format("%Y-%m-%d").to_string(),
                ts.time().format("%H:%M:%S").to_string(),
                self.bucket_of(&ts),
            ],
        )?;
        if written > 0 {
            tracing::info!(identity, at = %ts, "attendance recorded");
        } else {
            tracing::debug!(identity, at = %ts, "attendance already recorded in this bucket");
        }
        Ok(written > 0)
    }

    /// Ensure a directory row exists; non-empty details overwrite.
    pub fn upsert_student(&self, name: &str, details: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let details = details.unwrap_or("");
        conn.execute(
            "INSERT OR IGNORE INTO students (name, details) VALUES (?1, ?2)",
            params![name, details],
        )?;
        conn.execute(
            "UPDATE students SET details = COALESCE(NULLIF(?2, ''), details) WHERE name = ?1",
            params![name, details],
        )?;
        Ok(())
    }

    /// Cascade an identity rename through the directory and the ledger.
    pub fn rename_identity(&self, old: &str, new: &str) -> Result<()> {
        let mut conn = self.conn.lock().expect("ledger lock poisoned");
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE OR IGNORE students SET name = ?2 WHERE name = ?1",
            params![old, new],
        )?;
        tx.execute("DELETE FROM students WHERE name = ?1", params![old])?;
        tx.execute(
            "UPDATE OR IGNORE attendance SET name = ?2 WHERE name = ?1",
            params![old, new],
        )?;
        // Rows colliding with an existing (new, date, bucket) entry are
        // duplicates under the dedup key; drop them.
        tx.execute("DELETE FROM attendance WHERE name = ?1", params![old])?;
        tx.commit()?;
        Ok(())
    }

    pub fn students(&self) -> Result<Vec<StudentRow>> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let mut stmt =
            conn.prepare("SELECT name, details FROM students ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StudentRow {
                    name: row.get(0)?,
                    details: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recent presence rows, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<AttendanceRow>> {
        self.select_rows(
            "SELECT name, date, time FROM attendance ORDER BY id DESC LIMIT ?1",
            params![limit],
        )
    }

    /// Distinct months ("YYYY-MM") with any presence rows, newest first.
    pub fn months(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT DISTINCT substr(date, 1, 7) AS ym FROM attendance ORDER BY ym DESC",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn for_month(&self, ym: &str) -> Result<Vec<AttendanceRow>> {
        self.select_rows(
            "SELECT name, date, time FROM attendance
             WHERE substr(date, 1, 7) = ?1 ORDER BY date DESC, time DESC",
            params![ym],
        )
    }

    pub fn history(&self, identity: &str) -> Result<Vec<AttendanceRow>> {
        self.select_rows(
            "SELECT name, date, time FROM attendance
             WHERE name = ?1 ORDER BY date DESC, time DESC",
            params![identity],
        )
    }

    /// Present/total distinct class dates for one identity.
    pub fn summary(&self, identity: &str) -> Result<AttendanceSummary> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let total: u32 =
            conn.query_row("SELECT COUNT(DISTINCT date) FROM attendance", [], |row| {
                row.get(0)
            })?;
        let present: u32 = conn.query_row(
            "SELECT COUNT(DISTINCT date) FROM attendance WHERE name = ?1",
            params![identity],
            |row| row.get(0),
        )?;
        let percentage = if total > 0 {
            (present as f64 / total as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        Ok(AttendanceSummary {
            name: identity.to_string(),
            present,
            total,
            percentage,
        })
    }

    fn select_rows(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<AttendanceRow>> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(AttendanceRow {
                    name: row.get(0)?,
                    date: row.get(1)?,
                    time: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_same_bucket_writes_once() {
        let ledger = Ledger::open_in_memory(60).unwrap();
        assert!(ledger.record_if_new("alice", ts(9, 30, 5)).unwrap());
        assert!(!ledger.record_if_new("alice", ts(9, 30, 40)).unwrap());
        assert_eq!(ledger.recent(10).unwrap().len(), 1);
    }

    #[test]
    fn test_next_bucket_writes_again() {
        let ledger = Ledger::open_in_memory(60).unwrap();
        assert!(ledger.record_if_new("alice", ts(9, 30, 59)).unwrap());
        assert!(ledger.record_if_new("alice", ts(9, 31, 0)).unwrap());
        assert_eq!(ledger.recent(10).unwrap().len(), 2);
    }

    #[test]
    fn test_distinct_identities_share_a_bucket() {
        let ledger = Ledger::open_in_memory(60).unwrap();
        assert!(ledger.record_if_new("alice", ts(9, 30, 5)).unwrap());
        assert!(ledger.record_if_new("bob", ts(9, 30, 10)).unwrap());
        assert_eq!(ledger.recent(10).unwrap().len(), 2);
    }

    #[test]
    fn test_daily_granularity() {
        let ledger = Ledger::open_in_memory(86_400).unwrap();
        assert!(ledger.record_if_new("alice", ts(8, 0, 0)).unwrap());
        assert!(!ledger.record_if_new("alice", ts(15, 45, 0)).unwrap());

        let next_day = NaiveDate::from_ymd_opt(2026, 3, 6)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert!(ledger.record_if_new("alice", next_day).unwrap());
    }

    #[test]
    fn test_recorded_row_shape() {
        let ledger = Ledger::open_in_memory(60).unwrap();
        ledger.record_if_new("alice", ts(9, 5, 7)).unwrap();
        assert_eq!(
            ledger.recent(10).unwrap(),
            vec![AttendanceRow {
                name: "alice".into(),
                date: "2026-03-05".into(),
                time: "09:05:07".into(),
            }]
        );
    }

    #[test]
    fn test_upsert_student_keeps_details_unless_replaced() {
        let ledger = Ledger::open_in_memory(60).unwrap();
        ledger.upsert_student("alice", Some("grade 10")).unwrap();
        ledger.upsert_student("alice", None).unwrap();
        ledger.upsert_student("alice", Some("")).unwrap();
        assert_eq!(ledger.students().unwrap()[0].details, "grade 10");

        ledger.upsert_student("alice", Some("grade 11")).unwrap();
        assert_eq!(ledger.students().unwrap()[0].details, "grade 11");
    }

    #[test]
    fn test_rename_cascades() {
        let ledger = Ledger::open_in_memory(60).unwrap();
        ledger.upsert_student("alice", Some("grade 10")).unwrap();
        ledger.record_if_new("alice", ts(9, 0, 0)).unwrap();

        ledger.rename_identity("alice", "alicia").unwrap();

        assert_eq!(ledger.students().unwrap()[0].name, "alicia");
        assert_eq!(ledger.history("alicia").unwrap().len(), 1);
        assert!(ledger.history("alice").unwrap().is_empty());
    }

    #[test]
    fn test_rename_collision_collapses_duplicates() {
        let ledger = Ledger::open_in_memory(60).unwrap();
        ledger.record_if_new("alice", ts(9, 0, 5)).unwrap();
        ledger.record_if_new("ally", ts(9, 0, 30)).unwrap();
        // Same (date, bucket) under both names: after the rename only one
        // row may survive for the merged identity.
        ledger.rename_identity("ally", "alice").unwrap();
        assert_eq!(ledger.history("alice").unwrap().len(), 1);
        assert!(ledger.history("ally").unwrap().is_empty());
    }

    #[test]
    fn test_month_report_queries() {
        let ledger = Ledger::open_in_memory(60).unwrap();
        ledger.record_if_new("alice", ts(9, 0, 0)).unwrap();
        let april = NaiveDate::from_ymd_opt(2026, 4, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        ledger.record_if_new("alice", april).unwrap();

        assert_eq!(ledger.months().unwrap(), vec!["2026-04", "2026-03"]);
        assert_eq!(ledger.for_month("2026-03").unwrap().len(), 1);
        assert!(ledger.for_month("2025-12").unwrap().is_empty());
    }

    #[test]
    fn test_summary_over_distinct_dates() {
        let ledger = Ledger::open_in_memory(60).unwrap();
        for day in [1, 2, 3, 4] {
            let t = NaiveDate::from_ymd_opt(2026, 3, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap();
            ledger.record_if_new("alice", t).unwrap();
            if day <= 3 {
                ledger.record_if_new("bob", t).unwrap();
            }
        }

        let summary = ledger.summary("bob").unwrap();
        assert_eq!(summary.present, 3);
        assert_eq!(summary.total, 4);
        assert!((summary.percentage - 75.0).abs() < 1e-9);

        let absent = ledger.summary("nobody").unwrap();
        assert_eq!(absent.present, 0);
        assert_eq!(absent.percentage, 0.0);
    }
}
