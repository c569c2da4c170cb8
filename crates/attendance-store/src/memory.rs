//! In-memory store with the same ordering rules as the SQLite store.

use async_trait::async_trait;
use attendance_core::store::validate_name;
use attendance_core::{
    AttendancePatch, AttendanceRecord, AttendanceStore, NewAttendance, NewSession, Session,
    SessionStatus, SessionStore, StoreError,
};
use chrono::Utc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    sessions: Vec<Session>,
    records: Vec<AttendanceRecord>,
    next_session_id: i64,
    next_record_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let tables = self.tables.lock().await;
        let mut sessions = tables.sessions.clone();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn get_session(&self, id: i64) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        validate_name("name", &session.name)?;
        let mut tables = self.tables.lock().await;
        tables.next_session_id += 1;
        let created = Session {
            id: tables.next_session_id,
            name: session.name,
            status: session.status,
            start_time: Utc::now(),
            end_time: None,
        };
        tables.sessions.push(created.clone());
        Ok(created)
    }

    async fn complete_session(&self, id: i64) -> Result<Option<Session>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(session) = tables.sessions.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        session.status = SessionStatus::Completed;
        session.end_time = Some(Utc::now());
        Ok(Some(session.clone()))
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn create_attendance(&self, record: NewAttendance) -> Result<AttendanceRecord, StoreError> {
        validate_name("student_name", &record.student_name)?;
        let mut tables = self.tables.lock().await;
        tables.next_record_id += 1;
        let created = AttendanceRecord {
            id: tables.next_record_id,
            session_id: record.session_id,
            student_name: record.student_name,
            confidence: record.confidence,
            snapshot: record.snapshot,
            timestamp: Utc::now(),
            verified: record.verified,
            face_descriptor: record.face_descriptor,
        };
        tables.records.push(created.clone());
        Ok(created)
    }

    async fn list_attendance(&self, session_id: i64) -> Result<Vec<AttendanceRecord>, StoreError> {
        let tables = self.tables.lock().await;
        let mut records: Vec<_> = tables
            .records
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn update_attendance(
        &self,
        id: i64,
        patch: AttendancePatch,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        if let Some(name) = &patch.student_name {
            validate_name("student_name", name)?;
        }
        let mut tables = self.tables.lock().await;
        let Some(record) = tables.records.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        patch.apply(record);
        Ok(Some(record.clone()))
    }

    async fn delete_attendance(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.records.len();
        tables.records.retain(|r| r.id != id);
        Ok(tables.records.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attendance(session_id: i64, name: &str) -> NewAttendance {
        NewAttendance {
            session_id,
            student_name: name.into(),
            confidence: 0.5,
            snapshot: String::new(),
            verified: true,
            face_descriptor: None,
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = MemoryStore::new();
        let session = store.create_session(NewSession::active("Physics")).await.unwrap();
        assert!(session.is_active());

        let completed = store.complete_session(session.id).await.unwrap().unwrap();
        assert_eq!(completed.status, SessionStatus::Completed);
        assert!(completed.end_time.is_some());
        assert_eq!(store.get_session(session.id).await.unwrap(), Some(completed));
    }

    #[tokio::test]
    async fn test_attendance_crud() {
        let store = MemoryStore::new();
        let first = store.create_attendance(attendance(1, "Student 1")).await.unwrap();
        let second = store.create_attendance(attendance(1, "Student 2")).await.unwrap();
        store.create_attendance(attendance(2, "Student 1")).await.unwrap();

        let ids: Vec<_> = store.list_attendance(1).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);

        let patch = AttendancePatch {
            verified: Some(false),
            ..Default::default()
        };
        let updated = store.update_attendance(first.id, patch).await.unwrap().unwrap();
        assert!(!updated.verified);
        assert_eq!(updated.student_name, "Student 1");

        assert!(store.delete_attendance(first.id).await.unwrap());
        assert_eq!(store.list_attendance(1).await.unwrap().len(), 1);
    }
}
