//! Cycle Scheduler
//!
//! Owns trigger timing and runs the collect -> render -> upload chain
//! exactly once per trigger. Three trigger classes funnel into the
//! same cycle:
//! - manual (user action, immediate, at-most-one-in-flight)
//! - daily (repeating local wall-clock timer)
//! - background (host-granted bounded execution window)
//!
//! Per-cycle state machine: `Idle -> Running -> {Completed | Failed}`,
//! always returning to `Idle`. A failed cycle never blocks subsequent
//! triggers; nothing is queued or resumed across runs.

use crate::aggregator::Aggregator;
use crate::auth::{AuthError, AuthGate};
use crate::formatter;
use crate::metrics::Window;
use crate::profile::ProfileStore;
use crate::upload::{SnapshotUploader, UploadError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// What caused a cycle to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Daily,
    Background,
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Daily => "daily",
            Trigger::Background => "background",
        }
    }
}

/// Cycle lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Outcome record for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub id: Uuid,
    pub trigger: Trigger,
    pub outcome: CycleState,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub uploaded_key: Option<String>,
    pub source_failures: usize,
    pub error: Option<String>,
}

/// Why a cycle could not run or did not complete.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("a cycle is already running")]
    Busy,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("cycle cancelled: execution window expired")]
    WindowExpired,

    #[error("no user display name configured")]
    MissingProfile,

    #[error("profile store error: {0}")]
    Profile(String),
}

/// Scheduler timing configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Local wall-clock hour the daily trigger targets.
    pub daily_hour: u32,
    pub daily_minute: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_hour: 17,
            daily_minute: 0,
        }
    }
}

/// A bounded off-foreground execution grant from the host.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionWindow {
    deadline: tokio::time::Instant,
}

impl ExecutionWindow {
    pub fn with_duration(duration: std::time::Duration) -> Self {
        Self {
            deadline: tokio::time::Instant::now() + duration,
        }
    }

    pub fn deadline(&self) -> tokio::time::Instant {
        self.deadline
    }
}

/// Host capability granting occasional bounded execution windows.
#[async_trait]
pub trait BackgroundHost: Send + Sync {
    /// Resolves when the host grants the next window.
    async fn request_window(&self) -> ExecutionWindow;
}

/// [`BackgroundHost`] that grants a fixed-duration window on a fixed
/// interval. Stands in for OS-granted background time when running as
/// a plain process.
pub struct IntervalBackgroundHost {
    every: std::time::Duration,
    window: std::time::Duration,
}

impl IntervalBackgroundHost {
    pub fn new(every: std::time::Duration, window: std::time::Duration) -> Self {
        Self { every, window }
    }
}

#[async_trait]
impl BackgroundHost for IntervalBackgroundHost {
    async fn request_window(&self) -> ExecutionWindow {
        tokio::time::sleep(self.every).await;
        ExecutionWindow::with_duration(self.window)
    }
}

/// Runs aggregation-and-upload cycles in response to triggers.
pub struct Scheduler {
    aggregator: Aggregator,
    gate: Arc<AuthGate>,
    uploader: Arc<dyn SnapshotUploader>,
    profile: Arc<ProfileStore>,
    config: SchedulerConfig,
    state: RwLock<CycleState>,
    last_report: RwLock<Option<CycleReport>>,
    // At most one cycle in flight across all trigger classes
    in_flight: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        aggregator: Aggregator,
        gate: Arc<AuthGate>,
        uploader: Arc<dyn SnapshotUploader>,
        profile: Arc<ProfileStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            aggregator,
            gate,
            uploader,
            profile,
            config,
            state: RwLock::new(CycleState::Idle),
            last_report: RwLock::new(None),
            in_flight: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> CycleState {
        *self.state.read().await
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// Manual trigger. Runs immediately; a second trigger while a
    /// cycle is in flight fails fast with [`CycleError::Busy`] instead
    /// of issuing an overlapping upload to the same key.
    pub async fn trigger_now(&self) -> Result<CycleReport, CycleError> {
        let _guard = self.in_flight.try_lock().map_err(|_| CycleError::Busy)?;
        Ok(self.run_cycle(Trigger::Manual).await)
    }

    /// Arm the repeating daily trigger. If today's target time has
    /// already passed, the first occurrence is pushed to the same time
    /// tomorrow.
    pub fn start_daily(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now = Local::now();
                let fire_at =
                    next_daily_fire(now, self.config.daily_hour, self.config.daily_minute);
                let wait = (fire_at - now).to_std().unwrap_or_default();
                tracing::info!(fire_at = %fire_at, "Daily upload armed");
                tokio::time::sleep(wait).await;

                let _guard = self.in_flight.lock().await;
                let report = self.run_cycle(Trigger::Daily).await;
                tracing::info!(
                    cycle = %report.id,
                    outcome = ?report.outcome,
                    "Daily cycle finished"
                );
            }
        })
    }

    /// Run background cycles: await each host-granted window, run one
    /// cycle inside it, and request a fresh window for next time
    /// regardless of outcome.
    pub fn start_background(self: Arc<Self>, host: Arc<dyn BackgroundHost>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let window = host.request_window().await;
                let report = self.run_in_window(window).await;
                tracing::info!(
                    cycle = %report.id,
                    outcome = ?report.outcome,
                    "Background cycle finished"
                );
            }
        })
    }

    /// Run one cycle bounded by an execution window. On expiration the
    /// in-flight cycle is cancelled and marked failed; the upload put
    /// is all-or-nothing, so cancellation never leaves a partial
    /// object behind.
    pub async fn run_in_window(&self, window: ExecutionWindow) -> CycleReport {
        let _guard = self.in_flight.lock().await;

        tokio::select! {
            report = self.run_cycle(Trigger::Background) => report,
            _ = tokio::time::sleep_until(window.deadline()) => {
                tracing::warn!("Execution window expired, cancelling in-flight cycle");
                *self.state.write().await = CycleState::Idle;
                let report = CycleReport {
                    id: Uuid::new_v4(),
                    trigger: Trigger::Background,
                    outcome: CycleState::Failed,
                    started_at: Utc::now(),
                    duration_ms: 0,
                    uploaded_key: None,
                    source_failures: 0,
                    error: Some(CycleError::WindowExpired.to_string()),
                };
                *self.last_report.write().await = Some(report.clone());
                report
            }
        }
    }

    /// One full cycle. Callers must hold the in-flight guard.
    async fn run_cycle(&self, trigger: Trigger) -> CycleReport {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        *self.state.write().await = CycleState::Running;
        tracing::info!(cycle = %id, trigger = trigger.label(), "Cycle started");

        let (outcome, uploaded_key, source_failures, error) = match self.execute().await {
            Ok((key, failures)) => {
                tracing::info!(cycle = %id, key = %key, "Cycle completed");
                (CycleState::Completed, Some(key), failures, None)
            }
            Err(e) => {
                tracing::warn!(cycle = %id, error = %e, "Cycle failed");
                (CycleState::Failed, None, 0, Some(e.to_string()))
            }
        };

        *self.state.write().await = outcome;
        // Failed never blocks the next trigger
        *self.state.write().await = CycleState::Idle;

        let report = CycleReport {
            id,
            trigger,
            outcome,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            uploaded_key,
            source_failures,
            error,
        };
        *self.last_report.write().await = Some(report.clone());
        report
    }

    /// Auth check, then collect -> render -> upload. Auth failures
    /// abort before any upload is attempted: either the full snapshot
    /// is uploaded or nothing is.
    async fn execute(&self) -> Result<(String, usize), CycleError> {
        let user_name = self
            .profile
            .user_name()
            .map_err(|e| CycleError::Profile(e.to_string()))?
            .ok_or(CycleError::MissingProfile)?;

        self.gate.ensure_fresh().await?;

        let captured_at = Local::now();
        let snapshot = self
            .aggregator
            .collect(Window::today_local(captured_at), captured_at, &user_name)
            .await;
        let source_failures = snapshot.diagnostics.len();

        let document = formatter::render(&snapshot);
        self.uploader.put(&document).await?;

        Ok((document.key, source_failures))
    }
}

/// Next occurrence of `hour:minute` local time strictly after `now`.
fn next_daily_fire(now: DateTime<Local>, hour: u32, minute: u32) -> DateTime<Local> {
    let target = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).single())
        .unwrap_or(now);

    if target <= now {
        target + Duration::days(1)
    } else {
        target
    }
}
