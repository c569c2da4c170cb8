use std::path::PathBuf;

use anyhow::{Context, Result};
use attendance_core::{AttendanceRecord, Session, TickReport, DEFAULT_MATCH_THRESHOLD};
use attendance_feed::ReplaySource;
use clap::{Parser, Subcommand};

mod proxy;
mod simulate;

use proxy::AttendanceProxy;

#[derive(Parser)]
#[command(name = "attendance", about = "Classroom attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage class sessions
    #[command(subcommand)]
    Session(SessionCommand),
    /// Control live face tracking for a session
    #[command(subcommand)]
    Track(TrackCommand),
    /// Inspect and correct attendance records
    #[command(subcommand)]
    Record(RecordCommand),
    /// Show daemon status
    Status,
    /// Run the detection cycle locally against a recorded feed
    Simulate {
        /// JSON Lines feed file
        feed: PathBuf,
        /// Number of ticks to run (default: one per recorded frame)
        #[arg(long)]
        ticks: Option<usize>,
        /// Maximum descriptor distance for a face to count as already seen
        #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD, value_parser = parse_threshold)]
        threshold: f32,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// List sessions, newest first
    List,
    /// Show one session
    Show { id: i64 },
    /// Create a new active session
    Create {
        /// Session name (e.g., "Math 101 - 10 AM")
        name: String,
    },
    /// End a session and stop its tracking
    Complete { id: i64 },
}

#[derive(Subcommand)]
enum TrackCommand {
    /// Start tracking attendance for a session
    Start { session: i64 },
    /// Stop tracking a session
    Stop { session: i64 },
    /// Show the tracking run of a session
    Status { session: i64 },
}

#[derive(Subcommand)]
enum RecordCommand {
    /// List attendance of a session, newest first
    List { session: i64 },
    /// Change the student name of a record
    Rename { id: i64, name: String },
    /// Mark a record verified or unverified
    Verify {
        id: i64,
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        verified: bool,
    },
    /// Remove a record
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Simulate {
            feed,
            ticks,
            threshold,
        } => return run_simulation(feed, ticks, threshold).await,
        command => command,
    };

    let conn = zbus::Connection::session()
        .await
        .context("cannot connect to the session bus")?;
    let daemon = AttendanceProxy::new(&conn)
        .await
        .context("cannot reach attendanced")?;

    match command {
        Commands::Session(cmd) => match cmd {
            SessionCommand::List => {
                let sessions: Vec<Session> = serde_json::from_str(&daemon.list_sessions().await?)?;
                if sessions.is_empty() {
                    println!("No sessions");
                }
                for session in &sessions {
                    println!("{}", format_session(session));
                }
            }
            SessionCommand::Show { id } => {
                let session: Session = serde_json::from_str(&daemon.get_session(id).await?)?;
                println!("{}", format_session(&session));
            }
            SessionCommand::Create { name } => {
                let session: Session = serde_json::from_str(&daemon.create_session(&name).await?)?;
                println!("Created {}", format_session(&session));
            }
            SessionCommand::Complete { id } => {
                let session: Session = serde_json::from_str(&daemon.complete_session(id).await?)?;
                println!("Completed {}", format_session(&session));
            }
        },
        Commands::Track(cmd) => match cmd {
            TrackCommand::Start { session } => {
                let status: serde_json::Value =
                    serde_json::from_str(&daemon.start_tracking(session).await?)?;
                println!("Tracking session {session} (run {})", status["run_id"].as_str().unwrap_or("?"));
            }
            TrackCommand::Stop { session } => {
                if daemon.stop_tracking(session).await? {
                    println!("Stopped tracking session {session}");
                } else {
                    println!("Session {session} was not being tracked");
                }
            }
            TrackCommand::Status { session } => {
                let status: serde_json::Value =
                    serde_json::from_str(&daemon.tracking_status(session).await?)?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
        },
        Commands::Record(cmd) => match cmd {
            RecordCommand::List { session } => {
                let records: Vec<AttendanceRecord> =
                    serde_json::from_str(&daemon.list_attendance(session).await?)?;
                if records.is_empty() {
                    println!("No attendance recorded");
                }
                for record in &records {
                    println!("{}", format_record(record));
                }
            }
            RecordCommand::Rename { id, name } => {
                let patch = serde_json::json!({ "student_name": name }).to_string();
                let record: AttendanceRecord =
                    serde_json::from_str(&daemon.update_attendance(id, &patch).await?)?;
                println!("Updated {}", format_record(&record));
            }
            RecordCommand::Verify { id, verified } => {
                let patch = serde_json::json!({ "verified": verified }).to_string();
                let record: AttendanceRecord =
                    serde_json::from_str(&daemon.update_attendance(id, &patch).await?)?;
                println!("Updated {}", format_record(&record));
            }
            RecordCommand::Delete { id } => {
                if daemon.delete_attendance(id).await? {
                    println!("Deleted record {id}");
                } else {
                    println!("No record {id}");
                }
            }
        },
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&daemon.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Simulate { .. } => unreachable!("handled before connecting"),
    }

    Ok(())
}

async fn run_simulation(feed: PathBuf, ticks: Option<usize>, threshold: f32) -> Result<()> {
    let source = ReplaySource::open(&feed, false)
        .await
        .with_context(|| format!("cannot load feed {}", feed.display()))?;
    let ticks = ticks.unwrap_or(source.len());
    tracing::debug!(feed = %feed.display(), frames = source.len(), ticks, threshold, "simulating");

    let summary = simulate::simulate(source, threshold, ticks, |n, report| match report {
        TickReport::Skipped { reason } => println!("tick {n:>4}: skipped ({reason})"),
        TickReport::Processed { sightings } if sightings.is_empty() => println!("tick {n:>4}: no faces"),
        TickReport::Processed { sightings } => {
            for s in sightings {
                let tag = if s.is_new { "NEW  " } else { "known" };
                println!(
                    "tick {n:>4}: {tag} {:<12} score {:.2} at ({:.0}, {:.0}) {:.0}x{:.0}",
                    s.label, s.score, s.bounding_box.x, s.bounding_box.y, s.bounding_box.width, s.bounding_box.height
                );
            }
        }
    })
    .await?;

    println!();
    println!(
        "{} ticks ({} skipped), {} students counted",
        summary.ticks, summary.skipped, summary.roster_size
    );
    if let Some(reason) = &summary.halted {
        println!("stopped early: {reason}");
    }
    for record in &summary.records {
        println!("{}", format_record(record));
    }
    Ok(())
}

fn parse_threshold(value: &str) -> Result<f32, String> {
    let threshold: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if !threshold.is_finite() || threshold < 0.0 {
        return Err("threshold must be a finite, non-negative distance".into());
    }
    Ok(threshold)
}

fn format_session(session: &Session) -> String {
    let ended = session
        .end_time
        .map(|t| format!(", ended {}", t.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    format!(
        "#{} {} [{}] started {}{}",
        session.id,
        session.name,
        session.status.as_str(),
        session.start_time.format("%Y-%m-%d %H:%M"),
        ended
    )
}

fn format_record(record: &AttendanceRecord) -> String {
    format!(
        "#{} {} confidence {:.0}% at {}{}",
        record.id,
        record.student_name,
        record.confidence * 100.0,
        record.timestamp.format("%H:%M:%S"),
        if record.verified { "" } else { " (unverified)" }
    )
}
