use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS request_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    operation TEXT NOT NULL,
    latency_ms INTEGER NOT NULL,
    success INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_request_log_timestamp ON request_log(timestamp);
"#;

/// SQLite-backed request log. Requests are handled on concurrent tasks, so
/// the connection sits behind a mutex.
pub struct MetricsStore {
    conn: Mutex<Connection>,
}

impl MetricsStore {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "auto_vacuum", "INCREMENTAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record(&self, operation: &str, latency_ms: u64, success: bool) {
        if let Ok(conn) = self.conn.lock() {
            let _ = conn.execute(
                "INSERT INTO request_log (timestamp, operation, latency_ms, success)
                 VALUES (datetime('now'), ?1, ?2, ?3)",
                params![operation, latency_ms as i64, success as i32],
            );
        }
    }

    pub fn get_summary(&self, retention_days: u32) -> MetricsSummary {
        let query = format!(
            r#"
            SELECT
                COUNT(*) as total_requests,
                COALESCE(AVG(latency_ms), 0) as avg_latency_ms,
                COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END) * 100.0 / NULLIF(COUNT(*), 0), 0) as error_rate
            FROM request_log
            WHERE timestamp >= datetime('now', '-{} days')
            "#,
            retention_days
        );

        let Ok(conn) = self.conn.lock() else {
            return MetricsSummary::default();
        };

        conn.query_row(&query, [], |row| {
            Ok(MetricsSummary {
                total_requests: row.get::<_, i64>(0)? as u64,
                avg_latency_ms: row.get::<_, f64>(1)? as u64,
                error_rate: row.get::<_, f64>(2)? as f32,
            })
        })
        .unwrap_or_default()
    }

    pub fn cleanup(&self, retention_days: u32) {
        let query = format!(
            "DELETE FROM request_log WHERE timestamp < datetime('now', '-{} days')",
            retention_days
        );
        if let Ok(conn) = self.conn.lock() {
            let _ = conn.execute(&query, []);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub avg_latency_ms: u64,
    pub error_rate: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_summarize() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricsStore::open(&dir.path().join("metrics.db")).unwrap();

        store.record("add", 12, true);
        store.record("search", 30, true);
        store.record("search", 8, false);

        let summary = store.get_summary(7);
        assert_eq!(summary.total_requests, 3);
        assert!(summary.error_rate > 0.0);
    }

    #[test]
    fn test_empty_summary_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricsStore::open(&dir.path().join("metrics.db")).unwrap();

        let summary = store.get_summary(7);
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.error_rate, 0.0);
    }
}
