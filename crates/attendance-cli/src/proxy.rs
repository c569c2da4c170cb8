//! Client side of the `org.classroom.Attendance1` D-Bus interface.

use zbus::proxy;

#[proxy(
    interface = "org.classroom.Attendance1",
    default_service = "org.classroom.Attendance1",
    default_path = "/org/classroom/Attendance1"
)]
pub trait Attendance {
    fn list_sessions(&self) -> zbus::Result<String>;
    fn get_session(&self, id: i64) -> zbus::Result<String>;
    fn create_session(&self, name: &str) -> zbus::Result<String>;
    fn complete_session(&self, id: i64) -> zbus::Result<String>;
    fn start_tracking(&self, session_id: i64) -> zbus::Result<String>;
    fn stop_tracking(&self, session_id: i64) -> zbus::Result<bool>;
    fn tracking_status(&self, session_id: i64) -> zbus::Result<String>;
    fn list_attendance(&self, session_id: i64) -> zbus::Result<String>;
    fn update_attendance(&self, id: i64, patch: &str) -> zbus::Result<String>;
    fn delete_attendance(&self, id: i64) -> zbus::Result<bool>;
    fn status(&self) -> zbus::Result<String>;
}
