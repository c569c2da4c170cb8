//! Detection cycle: periodic capture, classification and registration.
//!
//! One cycle owns one roster and one face source for the lifetime of a
//! tracking run. Ticks run to completion before the next one is scheduled,
//! and the detections of a frame are processed strictly in order so a face
//! registered early in a batch is already known to the rest of it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::matcher::{Classification, EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
use crate::roster::Roster;
use crate::source::{CaptureError, FaceSource};
use crate::store::{AttendanceStore, StoreError};
use crate::types::{AttendanceRecord, BoundingBox, Detection, NewAttendance};

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("face source unavailable: {0}")]
    SourceUnavailable(String),
}

#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub session_id: i64,
    pub threshold: f32,
    pub tick_interval: Duration,
}

impl CycleConfig {
    pub fn new(session_id: i64) -> Self {
        Self {
            session_id,
            threshold: DEFAULT_MATCH_THRESHOLD,
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Label and box of one face in a processed frame, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sighting {
    pub label: String,
    pub bounding_box: BoundingBox,
    pub score: f32,
    /// First sighting of this person in the session.
    pub is_new: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// Frame was not ready; nothing was classified.
    Skipped { reason: String },
    Processed { sightings: Vec<Sighting> },
}

impl TickReport {
    pub fn sightings(&self) -> &[Sighting] {
        match self {
            TickReport::Skipped { .. } => &[],
            TickReport::Processed { sightings } => sightings,
        }
    }
}

/// Notifications for whoever supervises the cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    Sightings(Vec<Sighting>),
    Registered { label: String, record_id: i64 },
    /// Persisting a registration failed. The identity stays in the roster.
    StoreFailed { label: String, error: String },
    Halted { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleExit {
    Stopped,
    Failed(String),
}

pub struct DetectionCycle<S> {
    config: CycleConfig,
    source: S,
    store: Arc<dyn AttendanceStore>,
    matcher: EuclideanMatcher,
    roster: Roster,
    events: Option<mpsc::UnboundedSender<CycleEvent>>,
}

impl<S: FaceSource> DetectionCycle<S> {
    /// Start a cycle with an empty roster.
    pub fn new(config: CycleConfig, source: S, store: Arc<dyn AttendanceStore>) -> Self {
        let matcher = EuclideanMatcher::new(config.threshold);
        Self {
            config,
            source,
            store,
            matcher,
            roster: Roster::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<CycleEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn session_id(&self) -> i64 {
        self.config.session_id
    }

    /// Capture one frame and process its detections in order.
    pub async fn tick(&mut self) -> Result<TickReport, CycleError> {
        let frame = match self.source.capture().await {
            Ok(frame) => frame,
            Err(CaptureError::NotReady(reason)) => {
                tracing::debug!(session_id = self.config.session_id, %reason, "frame not ready; skipping tick");
                return Ok(TickReport::Skipped { reason });
            }
            Err(CaptureError::Unavailable(reason)) => {
                return Err(CycleError::SourceUnavailable(reason));
            }
        };

        let mut sightings = Vec::with_capacity(frame.detections.len());
        for detection in &frame.detections {
            if !self.accepts(detection) {
                continue;
            }

            match self.matcher.classify(&detection.descriptor, self.roster.identities()) {
                Classification::Known { label, distance } => {
                    tracing::debug!(session_id = self.config.session_id, %label, distance, "known face");
                    sightings.push(Sighting {
                        label,
                        bounding_box: detection.bounding_box,
                        score: detection.score,
                        is_new: false,
                    });
                }
                Classification::New { nearest_distance } => {
                    let label = self.roster.register(detection.descriptor.clone()).label.clone();
                    tracing::info!(
                        session_id = self.config.session_id,
                        %label,
                        nearest_distance = ?nearest_distance,
                        score = detection.score,
                        "new face registered"
                    );
                    let record = self.attendance_for(&label, detection, &frame.snapshot);
                    let outcome = self.store.create_attendance(record).await;
                    self.on_recorded(&label, outcome);
                    sightings.push(Sighting {
                        label,
                        bounding_box: detection.bounding_box,
                        score: detection.score,
                        is_new: true,
                    });
                }
            }
        }

        if !sightings.is_empty() {
            self.emit(CycleEvent::Sightings(sightings.clone()));
        }
        Ok(TickReport::Processed { sightings })
    }

    /// Tick at the configured cadence until `stop` turns true or its sender is dropped.
    ///
    /// The source and roster are dropped when this returns, on every exit path.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> CycleExit {
        let period = self.config.tick_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            session_id = self.config.session_id,
            threshold = self.config.threshold,
            interval_ms = period.as_millis() as u64,
            "detection cycle started"
        );

        let exit = loop {
            if *stop.borrow() {
                break CycleExit::Stopped;
            }

            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        break CycleExit::Stopped;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if *stop.borrow() {
                break CycleExit::Stopped;
            }

            if let Err(err) = self.tick().await {
                tracing::error!(session_id = self.config.session_id, error = %err, "detection cycle halted");
                self.emit(CycleEvent::Halted {
                    error: err.to_string(),
                });
                break CycleExit::Failed(err.to_string());
            }
        };

        tracing::info!(
            session_id = self.config.session_id,
            roster_size = self.roster.len(),
            exit = ?exit,
            "detection cycle ended"
        );
        exit
    }

    fn accepts(&self, detection: &Detection) -> bool {
        let descriptor = &detection.descriptor;
        if descriptor.is_empty() || !descriptor.is_finite() {
            tracing::warn!(session_id = self.config.session_id, "ignoring malformed face descriptor");
            return false;
        }
        if let Some(dim) = self.roster.dimension() {
            if descriptor.len() != dim {
                tracing::warn!(
                    session_id = self.config.session_id,
                    expected = dim,
                    actual = descriptor.len(),
                    "ignoring face descriptor of unexpected length"
                );
                return false;
            }
        }
        true
    }

    fn attendance_for(&self, label: &str, detection: &Detection, snapshot: &str) -> NewAttendance {
        NewAttendance {
            session_id: self.config.session_id,
            student_name: label.to_string(),
            confidence: detection.score,
            snapshot: snapshot.to_string(),
            verified: true,
            face_descriptor: Some(detection.descriptor.clone()),
        }
    }

    fn on_recorded(&self, label: &str, outcome: Result<AttendanceRecord, StoreError>) {
        match outcome {
            Ok(stored) => {
                tracing::debug!(session_id = self.config.session_id, label, record_id = stored.id, "attendance recorded");
                self.emit(CycleEvent::Registered {
                    label: label.to_string(),
                    record_id: stored.id,
                });
            }
            Err(err) => {
                // No retry: the roster keeps the identity so the face is not offered again.
                tracing::warn!(session_id = self.config.session_id, label, error = %err, "failed to record attendance");
                self.emit(CycleEvent::StoreFailed {
                    label: label.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    fn emit(&self, event: CycleEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
