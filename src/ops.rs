use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::file_cleaner::safety::RiskLevel;
use crate::file_cleaner::types::{Category, CleanEvent};

const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Pause/resume/cancel handle shared between the UI and a run. Observed at
/// the per-candidate boundary only.
#[derive(Clone, Debug)]
pub struct RunControl {
    token: CancellationToken,
    gate: Arc<PauseGate>,
}

#[derive(Debug, Default)]
struct PauseGate {
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl RunControl {
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    pub fn from_token(token: CancellationToken) -> Self {
        RunControl {
            token,
            gate: Arc::new(PauseGate::default()),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
        self.gate.resumed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn pause(&self) {
        *self.lock() = true;
    }

    pub fn resume(&self) {
        *self.lock() = false;
        self.gate.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.lock()
    }

    /// Blocks while paused. Returns `false` once the run is cancelled.
    pub fn wait_if_paused(&self) -> bool {
        let mut paused = self.lock();
        while *paused {
            if self.token.is_cancelled() {
                return false;
            }
            paused = match self.gate.resumed.wait_timeout(paused, PAUSE_POLL) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        !self.token.is_cancelled()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, bool> {
        self.gate
            .paused
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Discovery,
    Duplicates,
    Cleaning,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub root: PathBuf,
    pub category: Category,
    pub phase: RunPhase,
    /// Completion of `root` in the current phase, 0..=100.
    pub percent: f32,
    pub current_path: Option<PathBuf>,
    pub risk: RiskLevel,
}

/// Receives progress and the verdict/outcome stream. Called from worker
/// threads; events of one root arrive in traversal order.
pub trait RunObserver: Send + Sync {
    fn on_progress(&self, _progress: &ProgressEvent) {}

    fn on_event(&self, _event: &CleanEvent) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}
