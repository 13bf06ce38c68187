//! Task execution state tracking
//!
//! Per-task lifecycle states and dispatcher-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

// ─────────────────────────────────────────────────────────────────
// Task State
// ─────────────────────────────────────────────────────────────────

/// State of one execution task
///
/// Transitions only move forward: `Created → Running → Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Built, not yet picked up by a scheduler
    #[default]
    Created,
    /// The command is executing
    Running,
    /// The callback has returned
    Completed,
}

/// Timing of a task's lifecycle
#[derive(Debug, Clone)]
pub struct TaskTimings {
    /// When the task was built
    pub created_at: Instant,

    /// When the entry point started
    pub started_at: Option<Instant>,

    /// When the callback returned
    pub completed_at: Option<Instant>,
}

impl TaskTimings {
    pub(crate) fn new() -> Self {
        Self {
            created_at: Instant::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Time spent waiting for a scheduler
    pub fn queue_time_ms(&self) -> u64 {
        self.started_at
            .map(|s| (s - self.created_at).as_millis() as u64)
            .unwrap_or(0)
    }

    /// Time from entry point start to callback return
    pub fn execution_time_ms(&self) -> u64 {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).as_millis() as u64,
            (Some(start), None) => start.elapsed().as_millis() as u64,
            _ => 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Dispatch Tracker
// ─────────────────────────────────────────────────────────────────

/// Snapshot of dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Tasks handed to the scheduler
    pub dispatched: u64,
    /// Tasks whose callback has returned
    pub completed: u64,
    /// Completed tasks that could not spawn their process
    pub spawn_failures: u64,
    /// Completed tasks that spawned but exited non-zero
    pub nonzero_exits: u64,
}

impl DispatchStats {
    /// Tasks dispatched but not yet completed
    pub fn in_flight(&self) -> u64 {
        self.dispatched.saturating_sub(self.completed)
    }
}

/// Counts tasks through the dispatcher
#[derive(Debug)]
pub struct DispatchTracker {
    dispatched: AtomicU64,
    completed: AtomicU64,
    spawn_failures: AtomicU64,
    nonzero_exits: AtomicU64,
}

impl DispatchTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            dispatched: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            spawn_failures: AtomicU64::new(0),
            nonzero_exits: AtomicU64::new(0),
        }
    }

    /// Record a task handed to the scheduler
    pub fn mark_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a delivered result
    pub fn mark_completed(&self, spawn_failed: bool, exit_status: i32) {
        if spawn_failed {
            self.spawn_failures.fetch_add(1, Ordering::SeqCst);
        } else if exit_status != 0 {
            self.nonzero_exits.fetch_add(1, Ordering::SeqCst);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Current counters
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            spawn_failures: self.spawn_failures.load(Ordering::SeqCst),
            nonzero_exits: self.nonzero_exits.load(Ordering::SeqCst),
        }
    }
}

impl Default for DispatchTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
