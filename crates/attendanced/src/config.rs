use std::path::PathBuf;
use std::time::Duration;

use attendance_core::DEFAULT_MATCH_THRESHOLD;

const DEFAULT_SEED_SESSION: &str = "Computer Science 101";

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Recorded feed replayed for every tracking run.
    pub feed_path: PathBuf,
    /// Restart the feed from the top when it runs out.
    pub feed_loop: bool,
    /// Maximum Euclidean descriptor distance for a face to count as already seen.
    pub match_threshold: f32,
    /// Time between detection ticks.
    pub tick_interval: Duration,
    /// Name of the session created on first start; `None` disables seeding.
    pub seed_session: Option<String>,
}

impl Config {
    /// Load configuration from `ATTENDANCE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("attendance");

        let db_path = std::env::var("ATTENDANCE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let feed_path = std::env::var("ATTENDANCE_FEED_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("feed.jsonl"));

        let seed_session = seed_name(std::env::var("ATTENDANCE_SEED_SESSION").ok());

        Self {
            db_path,
            feed_path,
            feed_loop: std::env::var("ATTENDANCE_FEED_LOOP")
                .map(|v| v != "0")
                .unwrap_or(true),
            match_threshold: env_threshold("ATTENDANCE_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            tick_interval: Duration::from_millis(env_u64("ATTENDANCE_TICK_MS", 1000).max(1)),
            seed_session,
        }
    }
}

/// Session seeded on first start: unset means the default name, blank disables seeding.
fn seed_name(value: Option<String>) -> Option<String> {
    match value {
        Some(name) if name.trim().is_empty() => None,
        Some(name) => Some(name),
        None => Some(DEFAULT_SEED_SESSION.to_string()),
    }
}

fn env_threshold(key: &str, default: f32) -> f32 {
    parse_threshold(std::env::var(key).ok().as_deref(), default)
}

fn parse_threshold(value: Option<&str>, default: f32) -> f32 {
    value
        .and_then(|v| v.trim().parse::<f32>().ok())
        .filter(|t| t.is_finite() && *t >= 0.0)
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    parse_u64(std::env::var(key).ok().as_deref(), default)
}

fn parse_u64(value: Option<&str>, default: u64) -> u64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_parsing() {
        assert_eq!(parse_threshold(Some("0.42"), 0.5), 0.42);
        assert_eq!(parse_threshold(Some(" 0.6 "), 0.5), 0.6);
        assert_eq!(parse_threshold(Some("0"), 0.5), 0.0);
    }

    #[test]
    fn test_invalid_threshold_falls_back() {
        for bad in ["abc", "", "NaN", "inf", "-0.1"] {
            assert_eq!(parse_threshold(Some(bad), 0.5), 0.5, "value {bad:?}");
        }
        assert_eq!(parse_threshold(None, 0.5), 0.5);
    }

    #[test]
    fn test_u64_parsing() {
        assert_eq!(parse_u64(Some("250"), 1000), 250);
        assert_eq!(parse_u64(Some("-5"), 1000), 1000);
        assert_eq!(parse_u64(Some("fast"), 1000), 1000);
        assert_eq!(parse_u64(None, 1000), 1000);
    }

    #[test]
    fn test_seed_name() {
        assert_eq!(seed_name(None).as_deref(), Some(DEFAULT_SEED_SESSION));
        assert_eq!(seed_name(Some("Math 101".into())).as_deref(), Some("Math 101"));
        assert_eq!(seed_name(Some(String::new())), None);
        assert_eq!(seed_name(Some("   ".into())), None);
    }
}
