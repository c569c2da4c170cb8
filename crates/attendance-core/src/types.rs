use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounding box of a detected face, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Face embedding vector produced by the external recognition model.
///
/// Serialized as a plain JSON array of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceDescriptor {
    pub values: Vec<f32>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Euclidean distance between two descriptors.
    ///
    /// Descriptors of different lengths are not comparable and yield
    /// `f32::INFINITY`.
    pub fn euclidean_distance(&self, other: &FaceDescriptor) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for FaceDescriptor {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// One face found in one frame by the external detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub descriptor: FaceDescriptor,
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
    /// Detector confidence in [0, 1].
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }
}

/// A class session, e.g. "Math 101 - 10 AM".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub name: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub name: String,
    #[serde(default = "default_status")]
    pub status: SessionStatus,
}

fn default_status() -> SessionStatus {
    SessionStatus::Active
}

impl NewSession {
    pub fn active(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: SessionStatus::Active,
        }
    }
}

/// A persisted attendance entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub session_id: i64,
    /// Auto-generated "Student N" or edited by hand.
    pub student_name: String,
    pub confidence: f32,
    /// Image data URI of the frame the student was first seen in.
    pub snapshot: String,
    pub timestamp: DateTime<Utc>,
    pub verified: bool,
    pub face_descriptor: Option<FaceDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttendance {
    pub session_id: i64,
    pub student_name: String,
    pub confidence: f32,
    pub snapshot: String,
    #[serde(default = "default_verified")]
    pub verified: bool,
    #[serde(default)]
    pub face_descriptor: Option<FaceDescriptor>,
}

fn default_verified() -> bool {
    true
}

/// Partial update of an attendance record. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendancePatch {
    pub session_id: Option<i64>,
    pub student_name: Option<String>,
    pub confidence: Option<f32>,
    pub snapshot: Option<String>,
    pub verified: Option<bool>,
    pub face_descriptor: Option<FaceDescriptor>,
}

impl AttendancePatch {
    pub fn is_empty(&self) -> bool {
        self == &AttendancePatch::default()
    }

    /// Apply the present fields to `record`.
    pub fn apply(&self, record: &mut AttendanceRecord) {
        if let Some(session_id) = self.session_id {
            record.session_id = session_id;
        }
        if let Some(name) = &self.student_name {
            record.student_name = name.clone();
        }
        if let Some(confidence) = self.confidence {
            record.confidence = confidence;
        }
        if let Some(snapshot) = &self.snapshot {
            record.snapshot = snapshot.clone();
        }
        if let Some(verified) = self.verified {
            record.verified = verified;
        }
        if let Some(descriptor) = &self.face_descriptor {
            record.face_descriptor = Some(descriptor.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = FaceDescriptor::new(vec![0.1, 0.2, 0.3]);
        assert_eq!(a.euclidean_distance(&a.clone()), 0.0);
    }

    #[test]
    fn test_euclidean_distance_3_4_5() {
        let a = FaceDescriptor::new(vec![0.0, 0.0]);
        let b = FaceDescriptor::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_length_mismatch() {
        let a = FaceDescriptor::new(vec![0.0, 0.0]);
        let b = FaceDescriptor::new(vec![0.0, 0.0, 0.0]);
        assert_eq!(a.euclidean_distance(&b), f32::INFINITY);
    }

    #[test]
    fn test_descriptor_serializes_as_array() {
        let d = FaceDescriptor::new(vec![0.5, -1.0]);
        assert_eq!(serde_json::to_string(&d).unwrap(), "[0.5,-1.0]");
        let back: FaceDescriptor = serde_json::from_str("[0.5,-1.0]").unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_non_finite_descriptor() {
        assert!(FaceDescriptor::new(vec![0.0, 1.0]).is_finite());
        assert!(!FaceDescriptor::new(vec![0.0, f32::NAN]).is_finite());
    }

    #[test]
    fn test_session_status_roundtrip_str() {
        for status in [SessionStatus::Active, SessionStatus::Completed] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("paused"), None);
    }

    #[test]
    fn test_patch_applies_only_present_fields() {
        let mut record = AttendanceRecord {
            id: 1,
            session_id: 7,
            student_name: "Student 1".into(),
            confidence: 0.9,
            snapshot: "data:image/jpeg;base64,".into(),
            timestamp: Utc::now(),
            verified: true,
            face_descriptor: None,
        };
        let patch = AttendancePatch {
            student_name: Some("Ada".into()),
            verified: Some(false),
            ..Default::default()
        };
        patch.apply(&mut record);
        assert_eq!(record.student_name, "Ada");
        assert!(!record.verified);
        assert_eq!(record.session_id, 7);
        assert_eq!(record.confidence, 0.9);
    }

    #[test]
    fn test_patch_from_partial_json() {
        let patch: AttendancePatch = serde_json::from_str(r#"{"student_name":"Grace"}"#).unwrap();
        assert_eq!(patch.student_name.as_deref(), Some("Grace"));
        assert!(patch.verified.is_none());
        assert!(!patch.is_empty());
        assert!(AttendancePatch::default().is_empty());
    }

    #[test]
    fn test_detection_uses_box_key() {
        let json = r#"{"descriptor":[0.1,0.2],"box":{"x":1,"y":2,"width":3,"height":4},"score":0.9}"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.descriptor.len(), 2);
        assert_eq!(det.bounding_box.width, 3.0);
    }
}
