use std::sync::Arc;

use attendance_core::{AttendancePatch, AttendanceStore, NewSession, SessionStore, StoreError};
use serde::Serialize;
use zbus::interface;

use crate::config::Config;
use crate::tracker::{TrackerError, TrackerRegistry};

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.classroom.Attendance1
/// Object path: /org/classroom/Attendance1
///
/// Structured results are returned as JSON strings.
pub struct AttendanceService {
    pub sessions: Arc<dyn SessionStore>,
    pub attendance: Arc<dyn AttendanceStore>,
    pub tracker: Arc<TrackerRegistry>,
    pub config: Config,
}

#[interface(name = "org.classroom.Attendance1")]
impl AttendanceService {
    /// List sessions, most recently started first.
    async fn list_sessions(&self) -> zbus::fdo::Result<String> {
        let sessions = self.sessions.list_sessions().await.map_err(store_error)?;
        to_json(&sessions)
    }

    async fn get_session(&self, id: i64) -> zbus::fdo::Result<String> {
        let session = self
            .sessions
            .get_session(id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| zbus::fdo::Error::InvalidArgs(format!("session {id} not found")))?;
        to_json(&session)
    }

    async fn create_session(&self, name: &str) -> zbus::fdo::Result<String> {
        tracing::info!(name, "create_session requested");
        let session = self
            .sessions
            .create_session(NewSession::active(name))
            .await
            .map_err(store_error)?;
        to_json(&session)
    }

    /// Complete a session, halting its tracking run first.
    async fn complete_session(&self, id: i64) -> zbus::fdo::Result<String> {
        tracing::info!(session_id = id, "complete_session requested");
        let session = self.tracker.complete(id).await.map_err(tracker_error)?;
        to_json(&session)
    }

    async fn start_tracking(&self, session_id: i64) -> zbus::fdo::Result<String> {
        tracing::info!(session_id, "start_tracking requested");
        let status = self.tracker.start(session_id).await.map_err(tracker_error)?;
        to_json(&status)
    }

    async fn stop_tracking(&self, session_id: i64) -> zbus::fdo::Result<bool> {
        tracing::info!(session_id, "stop_tracking requested");
        Ok(self.tracker.stop(session_id).await)
    }

    /// Status of the latest tracking run of a session.
    async fn tracking_status(&self, session_id: i64) -> zbus::fdo::Result<String> {
        let status = self.tracker.status(session_id).await.ok_or_else(|| {
            zbus::fdo::Error::InvalidArgs(format!("session {session_id} has not been tracked"))
        })?;
        to_json(&status)
    }

    /// List attendance records of a session, newest first.
    async fn list_attendance(&self, session_id: i64) -> zbus::fdo::Result<String> {
        let records = self
            .attendance
            .list_attendance(session_id)
            .await
            .map_err(store_error)?;
        to_json(&records)
    }

    /// Apply a partial update given as a JSON object.
    async fn update_attendance(&self, id: i64, patch: &str) -> zbus::fdo::Result<String> {
        tracing::info!(record_id = id, "update_attendance requested");
        let patch = parse_patch(patch)?;
        let record = self
            .attendance
            .update_attendance(id, patch)
            .await
            .map_err(store_error)?
            .ok_or_else(|| zbus::fdo::Error::InvalidArgs(format!("attendance record {id} not found")))?;
        to_json(&record)
    }

    async fn delete_attendance(&self, id: i64) -> zbus::fdo::Result<bool> {
        tracing::info!(record_id = id, "delete_attendance requested");
        self.attendance.delete_attendance(id).await.map_err(store_error)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "db_path": self.config.db_path.display().to_string(),
            "feed_path": self.config.feed_path.display().to_string(),
            "match_threshold": self.config.match_threshold,
            "tick_ms": self.config.tick_interval.as_millis() as u64,
            "active_runs": self.tracker.active_runs().await,
        })
        .to_string())
    }
}

/// Decode a JSON patch; a patch that changes nothing is rejected.
fn parse_patch(patch: &str) -> zbus::fdo::Result<AttendancePatch> {
    let patch: AttendancePatch = serde_json::from_str(patch)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid patch: {e}")))?;
    if patch.is_empty() {
        return Err(zbus::fdo::Error::InvalidArgs("patch has no fields".into()));
    }
    Ok(patch)
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn store_error(err: StoreError) -> zbus::fdo::Error {
    match err {
        StoreError::Validation { .. } => zbus::fdo::Error::InvalidArgs(err.to_string()),
        other => {
            tracing::warn!(error = %other, "store request failed");
            zbus::fdo::Error::Failed(other.to_string())
        }
    }
}

fn tracker_error(err: TrackerError) -> zbus::fdo::Error {
    match err {
        TrackerError::Store(err) => store_error(err),
        TrackerError::SessionNotFound(_) | TrackerError::SessionCompleted(_) => {
            zbus::fdo::Error::InvalidArgs(err.to_string())
        }
        TrackerError::SourceUnavailable(_) => {
            tracing::error!(error = %err, "tracking could not start");
            zbus::fdo::Error::Failed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::fdo::Error;

    #[test]
    fn test_parse_patch() {
        let patch = parse_patch(r#"{"student_name":"Ada","verified":false}"#).unwrap();
        assert_eq!(patch.student_name.as_deref(), Some("Ada"));
        assert_eq!(patch.verified, Some(false));
    }

    #[test]
    fn test_empty_patch_is_rejected() {
        for empty in ["{}", r#"{"verified":null}"#] {
            match parse_patch(empty) {
                Err(Error::InvalidArgs(msg)) => assert_eq!(msg, "patch has no fields"),
                other => panic!("expected invalid args for {empty}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_malformed_patch_is_invalid_args() {
        assert!(matches!(parse_patch("not json"), Err(Error::InvalidArgs(msg)) if msg.starts_with("invalid patch")));
        assert!(matches!(parse_patch(r#"{"verified":"yes"}"#), Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn test_store_error_mapping() {
        let validation = StoreError::Validation {
            field: "name",
            message: "must not be empty".into(),
        };
        assert!(matches!(
            store_error(validation),
            Error::InvalidArgs(msg) if msg == "invalid name: must not be empty"
        ));
        assert!(matches!(
            store_error(StoreError::Database("disk I/O error".into())),
            Error::Failed(msg) if msg == "database error: disk I/O error"
        ));
        assert!(matches!(
            store_error(StoreError::Corrupt("bad timestamp".into())),
            Error::Failed(_)
        ));
    }

    #[test]
    fn test_tracker_error_mapping() {
        assert!(matches!(
            tracker_error(TrackerError::SessionNotFound(7)),
            Error::InvalidArgs(msg) if msg == "session 7 not found"
        ));
        assert!(matches!(
            tracker_error(TrackerError::SessionCompleted(7)),
            Error::InvalidArgs(msg) if msg == "session 7 is completed"
        ));
        assert!(matches!(
            tracker_error(TrackerError::SourceUnavailable("feed exhausted".into())),
            Error::Failed(msg) if msg == "face source unavailable: feed exhausted"
        ));
        assert!(matches!(
            tracker_error(TrackerError::Store(StoreError::Validation {
                field: "name",
                message: "must not be empty".into(),
            })),
            Error::InvalidArgs(_)
        ));
    }
}
