//! Face source capability: frame capture plus descriptor extraction.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Detection;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// The frame is not ready yet (camera warming up, dark frame). Retry next tick.
    #[error("frame not ready: {0}")]
    NotReady(String),
    /// The capability is gone for good (permission denied, model missing).
    #[error("face source unavailable: {0}")]
    Unavailable(String),
}

impl CaptureError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::NotReady(_))
    }
}

/// One captured frame and the faces found in it, in detection order.
#[derive(Debug, Clone, Default)]
pub struct CapturedFrame {
    /// Image data URI of the full frame; may be empty if the source has no imagery.
    pub snapshot: String,
    pub detections: Vec<Detection>,
}

/// A live feed that yields detected faces per frame.
///
/// The underlying device is acquired when the source is constructed and
/// released when it is dropped.
#[async_trait]
pub trait FaceSource: Send {
    async fn capture(&mut self) -> Result<CapturedFrame, CaptureError>;
}

#[async_trait]
impl<S: FaceSource + ?Sized> FaceSource for Box<S> {
    async fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
        (**self).capture().await
    }
}
