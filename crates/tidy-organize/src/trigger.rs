//! Trigger manager: decides when an organization pass runs for a document.
//!
//! Each open document moves through `Idle -> Scheduled -> Running -> Idle`.
//! Content changes (re)arm an idle timer; a double Enter after content fires
//! immediately. Starting a run requires the debounce window to have elapsed
//! since the previous attempt and no run to be in flight for that document.
//! Attempts that cannot start are dropped, never queued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tidy_core::defaults::{DEBOUNCE_MS, IDLE_TIMEOUT_SECS};
use tidy_core::{ContentTree, Result};

/// Timing configuration for the trigger manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    /// Quiet period after the last content change before a run fires.
    pub idle_timeout: Duration,
    /// Minimum spacing between two run attempts for one document.
    pub debounce: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(IDLE_TIMEOUT_SECS),
            debounce: Duration::from_millis(DEBOUNCE_MS),
        }
    }
}

impl TriggerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TIDY_IDLE_TIMEOUT_SECS` | `30` | Idle time before an automatic run |
    /// | `TIDY_DEBOUNCE_MS` | `1000` | Minimum gap between run attempts |
    pub fn from_env() -> Self {
        let idle_timeout = std::env::var("TIDY_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(IDLE_TIMEOUT_SECS);
        let debounce = std::env::var("TIDY_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEBOUNCE_MS);

        Self {
            idle_timeout: Duration::from_secs(idle_timeout),
            debounce: Duration::from_millis(debounce),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Run state of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    /// An idle timer is armed.
    Scheduled,
    Running,
}

/// What caused a run attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    IdleTimeout,
    DoubleEnter,
    Manual,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::IdleTimeout => "idle_timeout",
            TriggerReason::DoubleEnter => "double_enter",
            TriggerReason::Manual => "manual",
        }
    }
}

/// Outcome of a run attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    Started,
    /// Dropped: the previous attempt was too recent.
    Debounced,
    /// Dropped: a run is already in flight for the document.
    AlreadyRunning,
}

/// The work a trigger starts. Implemented by the organization pipeline.
#[async_trait]
pub trait OrganizeRunner: Send + Sync + 'static {
    async fn run_pass(&self, document_id: Uuid) -> Result<()>;
}

/// Double-Enter heuristic: the cursor block and the one before it are empty
/// while the block two before the cursor has content.
pub fn is_double_enter(tree: &ContentTree, cursor_index: usize) -> bool {
    if cursor_index < 2 || cursor_index >= tree.blocks.len() {
        return false;
    }
    tree.blocks[cursor_index].is_empty()
        && tree.blocks[cursor_index - 1].is_empty()
        && !tree.blocks[cursor_index - 2].is_empty()
}

#[derive(Default)]
struct DocumentTrigger {
    running: bool,
    /// Closed while a run was in flight; the entry goes when the run ends.
    forgotten: bool,
    last_attempt: Option<Instant>,
    idle_timer: Option<JoinHandle<()>>,
    timer_generation: u64,
}

impl DocumentTrigger {
    fn state(&self) -> RunState {
        if self.running {
            RunState::Running
        } else if self.idle_timer.is_some() {
            RunState::Scheduled
        } else {
            RunState::Idle
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(handle) = self.idle_timer.take() {
            handle.abort();
        }
    }
}

struct TriggerInner {
    config: TriggerConfig,
    runner: Arc<dyn OrganizeRunner>,
    documents: DashMap<Uuid, DocumentTrigger>,
}

/// Per-document trigger state machine.
///
/// Cheap to clone; clones share state. Documents organize independently,
/// there is no process-wide lock.
#[derive(Clone)]
pub struct TriggerManager {
    inner: Arc<TriggerInner>,
}

/// Resets a document to not-running when the run task ends, including when
/// the run panics or is aborted.
struct RunGuard {
    inner: Arc<TriggerInner>,
    document_id: Uuid,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let forgotten = match self.inner.documents.get_mut(&self.document_id) {
            Some(mut entry) => {
                entry.running = false;
                entry.forgotten
            }
            None => false,
        };
        if forgotten {
            self.inner
                .documents
                .remove_if(&self.document_id, |_, d| d.forgotten && !d.running);
        }
    }
}

impl TriggerManager {
    pub fn new(config: TriggerConfig, runner: Arc<dyn OrganizeRunner>) -> Self {
        Self {
            inner: Arc::new(TriggerInner {
                config,
                runner,
                documents: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> TriggerConfig {
        self.inner.config
    }

    /// Current state of `document_id` (`Idle` for unknown documents).
    pub fn state(&self, document_id: Uuid) -> RunState {
        self.inner
            .documents
            .get(&document_id)
            .map(|d| d.state())
            .unwrap_or(RunState::Idle)
    }

    /// Report a content change: re-arms the idle timer.
    pub fn content_changed(&self, document_id: Uuid) {
        let mut entry = self.inner.documents.entry(document_id).or_default();
        entry.forgotten = false;
        entry.cancel_timer();
        entry.timer_generation += 1;

        let generation = entry.timer_generation;
        let manager = self.clone();
        let idle_timeout = self.inner.config.idle_timeout;
        entry.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            manager.idle_elapsed(document_id, generation);
        }));
    }

    /// Report a keystroke with the editor's current blocks and the index of
    /// the block holding the cursor. Re-arms the idle timer and fires
    /// immediately on a double Enter.
    pub fn keystroke(
        &self,
        document_id: Uuid,
        tree: &ContentTree,
        cursor_index: usize,
    ) -> Option<TriggerDecision> {
        self.content_changed(document_id);
        if is_double_enter(tree, cursor_index) {
            Some(self.try_start(document_id, TriggerReason::DoubleEnter))
        } else {
            None
        }
    }

    /// Ask for an immediate run, subject to debounce and single-flight.
    pub fn request_run(&self, document_id: Uuid) -> TriggerDecision {
        self.try_start(document_id, TriggerReason::Manual)
    }

    /// Stop tracking a closed document. A run in flight completes in the
    /// background and keeps the document single-flight until it ends.
    pub fn forget(&self, document_id: Uuid) {
        if let Some(mut entry) = self.inner.documents.get_mut(&document_id) {
            entry.cancel_timer();
            entry.timer_generation += 1;
            entry.last_attempt = None;
            entry.forgotten = true;
        }
        self.inner
            .documents
            .remove_if(&document_id, |_, d| !d.running);
    }

    /// Cancel every armed idle timer.
    pub fn shutdown(&self) {
        for mut entry in self.inner.documents.iter_mut() {
            entry.cancel_timer();
        }
        info!(
            subsystem = "organize",
            component = "trigger",
            documents = self.inner.documents.len(),
            "Trigger manager stopped"
        );
    }

    fn idle_elapsed(&self, document_id: Uuid, generation: u64) {
        {
            let Some(mut entry) = self.inner.documents.get_mut(&document_id) else {
                return;
            };
            if entry.timer_generation != generation {
                return;
            }
            entry.idle_timer = None;
        }
        self.try_start(document_id, TriggerReason::IdleTimeout);
    }

    fn try_start(&self, document_id: Uuid, reason: TriggerReason) -> TriggerDecision {
        let now = Instant::now();
        let mut entry = self.inner.documents.entry(document_id).or_default();
        entry.forgotten = false;

        let debounced = entry
            .last_attempt
            .is_some_and(|last| now.duration_since(last) < self.inner.config.debounce);
        entry.last_attempt = Some(now);

        if entry.running {
            debug!(
                subsystem = "organize",
                component = "trigger",
                document_id = %document_id,
                reason = reason.as_str(),
                "Run already in flight, trigger dropped"
            );
            return TriggerDecision::AlreadyRunning;
        }
        if debounced {
            debug!(
                subsystem = "organize",
                component = "trigger",
                document_id = %document_id,
                reason = reason.as_str(),
                "Trigger debounced"
            );
            return TriggerDecision::Debounced;
        }

        entry.running = true;
        if reason != TriggerReason::IdleTimeout {
            entry.cancel_timer();
        }
        drop(entry);

        debug!(
            subsystem = "organize",
            component = "trigger",
            document_id = %document_id,
            reason = reason.as_str(),
            "Starting organization run"
        );

        let guard = RunGuard {
            inner: self.inner.clone(),
            document_id,
        };
        let runner = self.inner.runner.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = runner.run_pass(document_id).await {
                warn!(
                    subsystem = "organize",
                    component = "trigger",
                    document_id = %document_id,
                    error = %e,
                    "Organization run failed"
                );
            }
        });
        TriggerDecision::Started
    }
}
