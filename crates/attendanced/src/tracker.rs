//! Live tracking runs, one per active session.
//!
//! Each run is a tokio task that owns a detection cycle (and through it the
//! roster and the face source). The registry keeps the stop handle and a
//! status snapshot that D-Bus callers can poll.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use attendance_core::{
    AttendanceStore, CaptureError, CycleConfig, CycleEvent, CycleExit, DetectionCycle, FaceSource,
    Session, SessionStore, Sighting, StoreError,
};
use attendance_feed::ReplaySource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;

/// Most recent notices kept per run.
const MAX_NOTICES: usize = 20;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("session {0} not found")]
    SessionNotFound(i64),
    #[error("session {0} is completed")]
    SessionCompleted(i64),
    #[error("face source unavailable: {0}")]
    SourceUnavailable(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Opens the face source for a new tracking run.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn open(&self, session_id: i64) -> Result<Box<dyn FaceSource>, CaptureError>;
}

/// Replays the configured recorded feed for every run.
pub struct ReplayFactory {
    config: Config,
}

impl ReplayFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SourceFactory for ReplayFactory {
    async fn open(&self, _session_id: i64) -> Result<Box<dyn FaceSource>, CaptureError> {
        let source = ReplaySource::open(&self.config.feed_path, self.config.feed_loop).await?;
        Ok(Box::new(source))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub session_id: i64,
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    /// Identities registered so far, whether or not they were saved.
    pub roster_size: usize,
    /// Registrations persisted to the attendance store.
    pub recorded: usize,
    /// Non-fatal problems, oldest first.
    pub notices: Vec<String>,
    /// Terminal error of a failed run.
    pub error: Option<String>,
    pub last_sightings: Vec<Sighting>,
}

impl RunStatus {
    fn new(session_id: i64, run_id: Uuid) -> Self {
        Self {
            session_id,
            run_id,
            state: RunState::Running,
            started_at: Utc::now(),
            roster_size: 0,
            recorded: 0,
            notices: Vec::new(),
            error: None,
            last_sightings: Vec::new(),
        }
    }

    fn apply(&mut self, event: CycleEvent) {
        match event {
            CycleEvent::Sightings(sightings) => self.last_sightings = sightings,
            CycleEvent::Registered { .. } => {
                self.roster_size += 1;
                self.recorded += 1;
            }
            CycleEvent::StoreFailed { label, error } => {
                self.roster_size += 1;
                self.push_notice(format!("attendance for {label} was not saved: {error}"));
            }
            CycleEvent::Halted { error } => self.error = Some(error),
        }
    }

    fn finish(&mut self, exit: &CycleExit) {
        match exit {
            CycleExit::Stopped => self.state = RunState::Stopped,
            CycleExit::Failed(error) => {
                self.state = RunState::Failed;
                self.error = Some(error.clone());
            }
        }
    }

    fn push_notice(&mut self, notice: String) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.remove(0);
        }
        self.notices.push(notice);
    }
}

struct Run {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<CycleExit>>,
    status: Arc<Mutex<RunStatus>>,
}

impl Run {
    fn status(&self) -> RunStatus {
        lock(&self.status).clone()
    }

    fn is_running(&self) -> bool {
        lock(&self.status).state == RunState::Running
    }

    /// Signal the cycle and wait for it to finish; no tick starts afterwards.
    async fn stop(&mut self) -> bool {
        let was_running = self.is_running();
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "tracking task panicked");
                let mut status = lock(&self.status);
                status.state = RunState::Failed;
                status.error = Some(format!("tracking task panicked: {e}"));
            }
        }
        was_running
    }
}

/// Stop the run of a session, if any. Returns whether it was running.
async fn stop_run(runs: &mut HashMap<i64, Run>, session_id: i64) -> bool {
    let Some(run) = runs.get_mut(&session_id) else {
        return false;
    };
    let was_running = run.stop().await;
    if was_running {
        tracing::info!(session_id, "tracking stopped");
    }
    was_running
}

fn lock(status: &Mutex<RunStatus>) -> MutexGuard<'_, RunStatus> {
    status.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct TrackerRegistry {
    sessions: Arc<dyn SessionStore>,
    attendance: Arc<dyn AttendanceStore>,
    sources: Arc<dyn SourceFactory>,
    config: Config,
    runs: tokio::sync::Mutex<HashMap<i64, Run>>,
}

impl TrackerRegistry {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        attendance: Arc<dyn AttendanceStore>,
        sources: Arc<dyn SourceFactory>,
        config: Config,
    ) -> Self {
        Self {
            sessions,
            attendance,
            sources,
            config,
            runs: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Start tracking an active session. Starting a session that is already
    /// being tracked returns the running status unchanged.
    pub async fn start(&self, session_id: i64) -> Result<RunStatus, TrackerError> {
        let mut runs = self.runs.lock().await;
        if let Some(run) = runs.get(&session_id) {
            if run.is_running() {
                return Ok(run.status());
            }
        }

        let session = self.active_session(session_id).await?;
        let source = self
            .sources
            .open(session_id)
            .await
            .map_err(|e| TrackerError::SourceUnavailable(e.to_string()))?;

        let run_id = Uuid::new_v4();
        let status = Arc::new(Mutex::new(RunStatus::new(session_id, run_id)));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let config = CycleConfig {
            session_id,
            threshold: self.config.match_threshold,
            tick_interval: self.config.tick_interval,
        };
        let cycle = DetectionCycle::new(config, source, self.attendance.clone()).with_events(events_tx);

        let task_status = status.clone();
        let span = tracing::info_span!("tracking", session_id, run_id = %run_id);
        let handle = tokio::spawn(
            async move {
                let pump = async {
                    while let Some(event) = events_rx.recv().await {
                        lock(&task_status).apply(event);
                    }
                };
                // the pump ends once the cycle, and with it the event sender, is dropped
                let (exit, ()) = tokio::join!(cycle.run(stop_rx), pump);
                lock(&task_status).finish(&exit);
                exit
            }
            .instrument(span),
        );

        tracing::info!(session_id, session = %session.name, run_id = %run_id, "tracking started");

        let run = Run {
            stop: stop_tx,
            handle: Some(handle),
            status,
        };
        let snapshot = run.status();
        runs.insert(session_id, run);
        Ok(snapshot)
    }

    /// Stop tracking a session. Returns whether a run was active.
    pub async fn stop(&self, session_id: i64) -> bool {
        let mut runs = self.runs.lock().await;
        stop_run(&mut runs, session_id).await
    }

    /// Stop tracking and mark the session completed.
    ///
    /// The run table stays locked until the session is stored as completed,
    /// so a concurrent `start` observes the completed session.
    pub async fn complete(&self, session_id: i64) -> Result<Session, TrackerError> {
        let mut runs = self.runs.lock().await;
        stop_run(&mut runs, session_id).await;
        let session = self
            .sessions
            .complete_session(session_id)
            .await?
            .ok_or(TrackerError::SessionNotFound(session_id))?;
        tracing::info!(session_id, "session completed");
        Ok(session)
    }

    pub async fn status(&self, session_id: i64) -> Option<RunStatus> {
        self.runs.lock().await.get(&session_id).map(Run::status)
    }

    /// Number of runs currently ticking.
    pub async fn active_runs(&self) -> usize {
        self.runs.lock().await.values().filter(|r| r.is_running()).count()
    }

    pub async fn stop_all(&self) {
        let mut runs = self.runs.lock().await;
        let ids: Vec<i64> = runs.keys().copied().collect();
        for session_id in ids {
            stop_run(&mut runs, session_id).await;
        }
    }

    async fn active_session(&self, session_id: i64) -> Result<Session, TrackerError> {
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(TrackerError::SessionNotFound(session_id))?;
        if !session.is_active() {
            return Err(TrackerError::SessionCompleted(session_id));
        }
        Ok(session)
    }
}
