//! SQLite-backed store, driven through `tokio-rusqlite` so queries run off
//! the async runtime.

use std::path::Path;

use async_trait::async_trait;
use attendance_core::store::validate_name;
use attendance_core::{
    AttendancePatch, AttendanceRecord, AttendanceStore, FaceDescriptor, NewAttendance, NewSession,
    Session, SessionStatus, SessionStore, StoreError,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'active',
    start_time  TEXT NOT NULL,
    end_time    TEXT
);
CREATE TABLE IF NOT EXISTS attendance_records (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id       INTEGER NOT NULL,
    student_name     TEXT NOT NULL,
    confidence       REAL NOT NULL,
    snapshot         TEXT NOT NULL,
    timestamp        TEXT NOT NULL,
    verified         INTEGER NOT NULL DEFAULT 1,
    face_descriptor  TEXT
);
CREATE INDEX IF NOT EXISTS idx_attendance_session ON attendance_records (session_id);
";

const SESSION_COLUMNS: &str = "id, name, status, start_time, end_time";
const RECORD_COLUMNS: &str =
    "id, session_id, student_name, confidence, snapshot, timestamp, verified, face_descriptor";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Database(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        let conn = Connection::open(path).await.map_err(db_error)?;
        tracing::info!(path = %path.display(), "opened attendance database");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await.map_err(db_error)?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(db_error)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_time DESC, id DESC"
                ))?;
                let sessions = stmt
                    .query_map([], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(sessions)
            })
            .await
            .map_err(db_error)
    }

    async fn get_session(&self, id: i64) -> Result<Option<Session>, StoreError> {
        self.conn
            .call(move |conn| {
                let session = conn
                    .query_row(
                        &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                        params![id],
                        session_from_row,
                    )
                    .optional()?;
                Ok(session)
            })
            .await
            .map_err(db_error)
    }

    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        validate_name("name", &session.name)?;
        let start_time = timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                let created = conn.query_row(
                    &format!(
                        "INSERT INTO sessions (name, status, start_time) VALUES (?1, ?2, ?3) \
                         RETURNING {SESSION_COLUMNS}"
                    ),
                    params![session.name, session.status.as_str(), start_time],
                    session_from_row,
                )?;
                Ok(created)
            })
            .await
            .map_err(db_error)
    }

    async fn complete_session(&self, id: i64) -> Result<Option<Session>, StoreError> {
        let end_time = timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                let session = conn
                    .query_row(
                        &format!(
                            "UPDATE sessions SET status = ?1, end_time = ?2 WHERE id = ?3 \
                             RETURNING {SESSION_COLUMNS}"
                        ),
                        params![SessionStatus::Completed.as_str(), end_time, id],
                        session_from_row,
                    )
                    .optional()?;
                Ok(session)
            })
            .await
            .map_err(db_error)
    }
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    async fn create_attendance(&self, record: NewAttendance) -> Result<AttendanceRecord, StoreError> {
        validate_name("student_name", &record.student_name)?;
        let descriptor = encode_descriptor(record.face_descriptor.as_ref())?;
        let now = timestamp(Utc::now());
        self.conn
            .call(move |conn| {
                let created = conn.query_row(
                    &format!(
                        "INSERT INTO attendance_records \
                         (session_id, student_name, confidence, snapshot, timestamp, verified, face_descriptor) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING {RECORD_COLUMNS}"
                    ),
                    params![
                        record.session_id,
                        record.student_name,
                        record.confidence as f64,
                        record.snapshot,
                        now,
                        record.verified,
                        descriptor,
                    ],
                    record_from_row,
                )?;
                Ok(created)
            })
            .await
            .map_err(db_error)
    }

    async fn list_attendance(&self, session_id: i64) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RECORD_COLUMNS} FROM attendance_records WHERE session_id = ?1 \
                     ORDER BY timestamp DESC, id DESC"
                ))?;
                let records = stmt
                    .query_map(params![session_id], record_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(db_error)
    }

    async fn update_attendance(
        &self,
        id: i64,
        patch: AttendancePatch,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        if let Some(name) = &patch.student_name {
            validate_name("student_name", name)?;
        }
        let descriptor = encode_descriptor(patch.face_descriptor.as_ref())?;
        self.conn
            .call(move |conn| {
                let updated = conn
                    .query_row(
                        &format!(
                            "UPDATE attendance_records SET \
                             session_id = COALESCE(?1, session_id), \
                             student_name = COALESCE(?2, student_name), \
                             confidence = COALESCE(?3, confidence), \
                             snapshot = COALESCE(?4, snapshot), \
                             verified = COALESCE(?5, verified), \
                             face_descriptor = COALESCE(?6, face_descriptor) \
                             WHERE id = ?7 RETURNING {RECORD_COLUMNS}"
                        ),
                        params![
                            patch.session_id,
                            patch.student_name,
                            patch.confidence.map(f64::from),
                            patch.snapshot,
                            patch.verified,
                            descriptor,
                            id,
                        ],
                        record_from_row,
                    )
                    .optional()?;
                Ok(updated)
            })
            .await
            .map_err(db_error)
    }

    async fn delete_attendance(&self, id: i64) -> Result<bool, StoreError> {
        self.conn
            .call(move |conn| {
                let removed = conn.execute("DELETE FROM attendance_records WHERE id = ?1", params![id])?;
                Ok(removed > 0)
            })
            .await
            .map_err(db_error)
    }
}

fn db_error(err: tokio_rusqlite::Error) -> StoreError {
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::FromSqlConversionFailure(_, _, e)) => {
            StoreError::Corrupt(e.to_string())
        }
        other => StoreError::Database(other.to_string()),
    }
}

/// RFC 3339 with fixed sub-second precision so text order is time order.
fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encode_descriptor(descriptor: Option<&FaceDescriptor>) -> Result<Option<String>, StoreError> {
    descriptor
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Database(format!("cannot encode face descriptor: {e}")))
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(2)?;
    let status = SessionStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown session status {status:?}").into(),
        )
    })?;
    let end_time = match row.get::<_, Option<String>>(4)? {
        Some(_) => Some(parse_time(row, 4)?),
        None => None,
    };

    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        status,
        start_time: parse_time(row, 3)?,
        end_time,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let face_descriptor = match row.get::<_, Option<String>>(7)? {
        Some(raw) => Some(
            serde_json::from_str::<FaceDescriptor>(&raw).map_err(|e| conversion_error(7, e))?,
        ),
        None => None,
    };
    let confidence: f64 = row.get(3)?;

    Ok(AttendanceRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        student_name: row.get(2)?,
        confidence: confidence as f32,
        snapshot: row.get(4)?,
        timestamp: parse_time(row, 5)?,
        verified: row.get(6)?,
        face_descriptor,
    })
}
