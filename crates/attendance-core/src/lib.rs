//! attendance-core — In-session face matching for classroom attendance.
//!
//! Classifies face descriptors against a per-session roster, registers
//! newly seen faces, and drives the periodic detection cycle that turns
//! registrations into attendance records.

pub mod cycle;
pub mod matcher;
pub mod roster;
pub mod source;
pub mod store;
pub mod types;

pub use cycle::{CycleConfig, CycleError, CycleEvent, CycleExit, DetectionCycle, Sighting, TickReport};
pub use matcher::{Classification, EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use roster::{Identity, Roster};
pub use source::{CaptureError, CapturedFrame, FaceSource};
pub use store::{AttendanceStore, SessionStore, StoreError};
pub use types::{
    AttendancePatch, AttendanceRecord, BoundingBox, Detection, FaceDescriptor, NewAttendance,
    NewSession, Session, SessionStatus,
};
