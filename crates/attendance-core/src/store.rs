//! Storage contracts for sessions and attendance records.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{AttendancePatch, AttendanceRecord, NewAttendance, NewSession, Session};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("database error: {0}")]
    Database(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// System of record for attendance entries.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn create_attendance(&self, record: NewAttendance) -> Result<AttendanceRecord, StoreError>;

    /// Records of one session, newest first.
    async fn list_attendance(&self, session_id: i64) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Returns `None` if no record has this id.
    async fn update_attendance(
        &self,
        id: i64,
        patch: AttendancePatch,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete_attendance(&self, id: i64) -> Result<bool, StoreError>;
}

/// Session lifecycle store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All sessions, most recently started first.
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError>;

    async fn get_session(&self, id: i64) -> Result<Option<Session>, StoreError>;

    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError>;

    /// Mark a session completed and stamp its end time.
    async fn complete_session(&self, id: i64) -> Result<Option<Session>, StoreError>;
}

/// Reject blank names before they reach storage.
pub fn validate_name(field: &'static str, name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::Validation {
            field,
            message: "must not be empty".into(),
        });
    }
    Ok(())
}
