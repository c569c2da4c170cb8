//! Offline run of the detection cycle against a recorded feed.

use std::sync::Arc;

use anyhow::Result;
use attendance_core::{
    AttendanceRecord, AttendanceStore, CycleConfig, DetectionCycle, FaceSource, NewSession,
    SessionStore, TickReport,
};
use attendance_store::MemoryStore;

pub struct Summary {
    pub ticks: usize,
    pub skipped: usize,
    pub roster_size: usize,
    /// Recorded attendance, newest first.
    pub records: Vec<AttendanceRecord>,
    /// Set when the source became unavailable before all ticks ran.
    pub halted: Option<String>,
}

/// Run up to `ticks` detection ticks back to back and collect what was recorded.
pub async fn simulate<S: FaceSource>(
    source: S,
    threshold: f32,
    ticks: usize,
    mut on_tick: impl FnMut(usize, &TickReport),
) -> Result<Summary> {
    let store = Arc::new(MemoryStore::new());
    let session = store.create_session(NewSession::active("Simulation")).await?;

    let mut config = CycleConfig::new(session.id);
    config.threshold = threshold;
    let mut cycle = DetectionCycle::new(config, source, store.clone());

    let mut summary = Summary {
        ticks: 0,
        skipped: 0,
        roster_size: 0,
        records: Vec::new(),
        halted: None,
    };

    for n in 1..=ticks {
        match cycle.tick().await {
            Ok(report) => {
                summary.ticks += 1;
                if matches!(report, TickReport::Skipped { .. }) {
                    summary.skipped += 1;
                }
                on_tick(n, &report);
            }
            Err(err) => {
                summary.halted = Some(err.to_string());
                break;
            }
        }
    }

    summary.roster_size = cycle.roster().len();
    summary.records = store.list_attendance(session.id).await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendance_feed::ReplaySource;
    use std::path::PathBuf;

    const FEED: &str = r#"{"detections":[{"descriptor":[0.0,0.0],"box":{"x":0,"y":0,"width":10,"height":10},"score":0.9}]}
null
{"detections":[{"descriptor":[0.7,0.0],"box":{"x":20,"y":0,"width":10,"height":10},"score":0.8}]}
{"detections":[{"descriptor":[0.0,0.3],"box":{"x":0,"y":0,"width":10,"height":10},"score":0.95}]}
"#;

    #[tokio::test]
    async fn test_simulate_recorded_feed() {
        let source = ReplaySource::from_jsonl(FEED, PathBuf::new(), false).unwrap();
        let mut seen = Vec::new();

        let summary = simulate(source, 0.5, 4, |n, report| {
            for s in report.sightings() {
                seen.push((n, s.label.clone(), s.is_new));
            }
        })
        .await
        .unwrap();

        assert_eq!(summary.ticks, 4);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.roster_size, 2);
        assert!(summary.halted.is_none());
        assert_eq!(
            seen,
            vec![
                (1, "Student 1".to_string(), true),
                (3, "Student 2".to_string(), true),
                (4, "Student 1".to_string(), false),
            ]
        );
        let names: Vec<_> = summary.records.iter().map(|r| r.student_name.as_str()).collect();
        assert_eq!(names, ["Student 2", "Student 1"]);
    }

    #[tokio::test]
    async fn test_simulate_halts_when_feed_runs_out() {
        let source = ReplaySource::from_jsonl(FEED, PathBuf::new(), false).unwrap();
        let summary = simulate(source, 0.5, 10, |_, _| {}).await.unwrap();

        assert_eq!(summary.ticks, 4);
        assert_eq!(
            summary.halted.as_deref(),
            Some("face source unavailable: feed exhausted")
        );
    }

    #[tokio::test]
    async fn test_strict_threshold_splits_identities() {
        let source = ReplaySource::from_jsonl(FEED, PathBuf::new(), false).unwrap();
        let summary = simulate(source, 0.1, 4, |_, _| {}).await.unwrap();
        assert_eq!(summary.roster_size, 3);
    }
}
