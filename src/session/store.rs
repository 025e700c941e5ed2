use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::errors::BlindsightError;
use crate::models::{ExtractionResult, InjectionReport};

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS confirmations (
    fingerprint TEXT PRIMARY KEY,
    report TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS progress (
    fingerprint TEXT NOT NULL,
    target_key TEXT NOT NULL,
    value TEXT NOT NULL,
    length INTEGER,
    ok INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (fingerprint, target_key)
);
";

/// Everything stored for one fingerprint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub fingerprint: String,
    pub report: Option<InjectionReport>,
    pub progress: HashMap<String, ExtractionResult>,
}

/// SQLite-backed record of confirmations and extraction progress.
///
/// Writes are serialized through one connection; resolved values are also
/// kept in a concurrent cache so readers never wait on a writer.
pub struct SessionStore {
    conn: Mutex<Connection>,
    resolved: DashMap<(String, String), ExtractionResult>,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self, BlindsightError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| BlindsightError::Database(format!("Failed to open session: {}", e)))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| BlindsightError::Database(format!("Failed to set pragmas: {}", e)))?;
        Self::initialize(conn)
    }

    pub fn in_memory() -> Result<Self, BlindsightError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BlindsightError::Database(format!("Failed to open in-memory session: {}", e)))?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, BlindsightError> {
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| BlindsightError::Database(format!("Failed to create tables: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
            resolved: DashMap::new(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BlindsightError> {
        self.conn
            .lock()
            .map_err(|_| BlindsightError::Session("session store lock poisoned".into()))
    }

    pub fn load(&self, fingerprint: &str) -> Result<Option<Session>, BlindsightError> {
        let report = self.report(fingerprint)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT target_key, value, length, ok FROM progress WHERE fingerprint = ?1",
        )?;
        let rows = stmt.query_map(params![fingerprint], |row| {
            let key: String = row.get(0)?;
            let length: Option<i64> = row.get(2)?;
            Ok((
                key,
                ExtractionResult {
                    value: row.get(1)?,
                    ok: row.get::<_, i64>(3)? != 0,
                    length: length.map(|l| l as usize),
                    violation: None,
                },
            ))
        })?;
        let progress = rows.collect::<Result<HashMap<_, _>, _>>()?;

        if report.is_none() && progress.is_empty() {
            return Ok(None);
        }
        Ok(Some(Session {
            fingerprint: fingerprint.to_string(),
            report,
            progress,
        }))
    }

    /// Store the confirmation and every progress entry in one transaction.
    pub fn save(&self, session: &Session) -> Result<(), BlindsightError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if let Some(report) = &session.report {
            upsert_report(&tx, &session.fingerprint, report)?;
        }
        for (key, result) in &session.progress {
            upsert_progress(&tx, &session.fingerprint, key, result)?;
        }
        tx.commit()?;
        drop(conn);

        for (key, result) in &session.progress {
            self.remember(&session.fingerprint, key, result);
        }
        Ok(())
    }

    pub fn save_report(&self, fingerprint: &str, report: &InjectionReport) -> Result<(), BlindsightError> {
        let conn = self.conn()?;
        upsert_report(&conn, fingerprint, report)
    }

    pub fn report(&self, fingerprint: &str) -> Result<Option<InjectionReport>, BlindsightError> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT report FROM confirmations WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Record progress for one target. A resolved value is never replaced.
    pub fn append_progress(&self, fingerprint: &str, key: &str, result: &ExtractionResult) -> Result<(), BlindsightError> {
        let conn = self.conn()?;
        upsert_progress(&conn, fingerprint, key, result)?;
        drop(conn);
        self.remember(fingerprint, key, result);
        Ok(())
    }

    pub fn progress(&self, fingerprint: &str, key: &str) -> Result<Option<ExtractionResult>, BlindsightError> {
        let cache_key = (fingerprint.to_string(), key.to_string());
        if let Some(hit) = self.resolved.get(&cache_key) {
            return Ok(Some(hit.clone()));
        }
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT value, length, ok FROM progress WHERE fingerprint = ?1 AND target_key = ?2",
                params![fingerprint, key],
                |row| {
                    let length: Option<i64> = row.get(1)?;
                    Ok(ExtractionResult {
                        value: row.get(0)?,
                        ok: row.get::<_, i64>(2)? != 0,
                        length: length.map(|l| l as usize),
                        violation: None,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Forget everything stored for `fingerprint`.
    pub fn flush(&self, fingerprint: &str) -> Result<(), BlindsightError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM confirmations WHERE fingerprint = ?1", params![fingerprint])?;
        let removed = tx.execute("DELETE FROM progress WHERE fingerprint = ?1", params![fingerprint])?;
        tx.commit()?;
        self.resolved.retain(|(fp, _), _| fp != fingerprint);
        debug!(fingerprint, removed, "Session flushed");
        Ok(())
    }

    fn remember(&self, fingerprint: &str, key: &str, result: &ExtractionResult) {
        if result.ok {
            self.resolved.insert((fingerprint.to_string(), key.to_string()), result.clone());
        }
    }
}

fn upsert_report(conn: &Connection, fingerprint: &str, report: &InjectionReport) -> Result<(), BlindsightError> {
    let json = serde_json::to_string(report)?;
    conn.execute(
        "INSERT INTO confirmations (fingerprint, report, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(fingerprint) DO UPDATE SET report = excluded.report, updated_at = excluded.updated_at",
        params![fingerprint, json, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn upsert_progress(conn: &Connection, fingerprint: &str, key: &str, result: &ExtractionResult) -> Result<(), BlindsightError> {
    conn.execute(
        "INSERT INTO progress (fingerprint, target_key, value, length, ok, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(fingerprint, target_key) DO UPDATE SET
            value = excluded.value, length = excluded.length, ok = excluded.ok, updated_at = excluded.updated_at
         WHERE progress.ok = 0",
        params![
            fingerprint,
            key,
            result.value,
            result.length.map(|l| l as i64),
            result.ok as i64,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(value: &str, length: usize) -> ExtractionResult {
        ExtractionResult { value: value.into(), ok: false, length: Some(length), violation: None }
    }

    #[test]
    fn test_progress_roundtrip() {
        let store = SessionStore::in_memory().unwrap();
        store.append_progress("fp", "banner", &partial("5.7", 6)).unwrap();
        assert_eq!(store.progress("fp", "banner").unwrap(), Some(partial("5.7", 6)));
        assert_eq!(store.progress("fp", "other").unwrap(), None);
    }

    #[test]
    fn test_resolved_value_never_regresses() {
        let store = SessionStore::in_memory().unwrap();
        store.append_progress("fp", "db", &ExtractionResult::complete("shop")).unwrap();
        store.append_progress("fp", "db", &partial("sh", 4)).unwrap();
        let stored = store.progress("fp", "db").unwrap().unwrap();
        assert!(stored.ok);
        assert_eq!(stored.value, "shop");
    }

    #[test]
    fn test_load_and_flush() {
        let store = SessionStore::in_memory().unwrap();
        assert!(store.load("fp").unwrap().is_none());

        let mut session = Session { fingerprint: "fp".into(), ..Default::default() };
        session.report = Some(InjectionReport::not_injectable());
        session.progress.insert("user".into(), ExtractionResult::complete("root"));
        store.save(&session).unwrap();

        let loaded = store.load("fp").unwrap().unwrap();
        assert_eq!(loaded, session);

        store.flush("fp").unwrap();
        assert!(store.load("fp").unwrap().is_none());
        assert_eq!(store.progress("fp", "user").unwrap(), None);
    }
}
