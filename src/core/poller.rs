use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::executions::{ExecutionStatus, StatusView};

/// Where the poller gets execution status from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, execution_id: &str) -> Result<StatusView>;

    async fn fetch_results(&self, execution_id: &str) -> Result<Vec<Value>>;
}

/// Synthetic progress shown while a run is in flight. It only ever grows,
/// stays below the ceiling until the run succeeds, and means nothing beyond
/// "still working".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEstimate {
    value: f64,
    ceiling: f64,
}

impl ProgressEstimate {
    pub fn new(ceiling: f64) -> Self {
        Self {
            value: 0.0,
            ceiling: ceiling.clamp(0.0, 99.0),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn advance(&mut self, step: f64) {
        if step.is_finite() && step > 0.0 {
            self.value = (self.value + step).min(self.ceiling);
        }
    }

    pub fn complete(&mut self) {
        self.value = 100.0;
    }
}

/// What the poller currently believes about its target.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    /// Bumped every time the target changes; updates from older targets are
    /// dropped.
    pub generation: u64,
    pub execution_id: Option<String>,
    pub status: ExecutionStatus,
    pub stats: Option<Value>,
    pub results: Option<Vec<Value>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: ProgressEstimate,
}

impl PollState {
    fn idle(generation: u64, ceiling: f64) -> Self {
        Self {
            generation,
            execution_id: None,
            status: ExecutionStatus::Ready,
            stats: None,
            results: None,
            started_at: None,
            finished_at: None,
            progress: ProgressEstimate::new(ceiling),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Polls one execution at a time. Tracking a new execution cancels the
/// previous task before the new one is scheduled.
pub struct ExecutionPoller {
    source: Arc<dyn StatusSource>,
    interval: Duration,
    progress_ceiling: f64,
    state: watch::Sender<PollState>,
    current: Option<CancellationToken>,
    generation: u64,
}

impl ExecutionPoller {
    pub fn new(source: Arc<dyn StatusSource>, interval: Duration, progress_ceiling: f64) -> Self {
        let (state, _) = watch::channel(PollState::idle(0, progress_ceiling));
        Self {
            source,
            interval,
            progress_ceiling,
            state,
            current: None,
            generation: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    /// Start polling `execution_id`. The state flips to RUNNING right away.
    pub fn track(&mut self, execution_id: &str) -> JoinHandle<()> {
        self.cancel();

        let token = CancellationToken::new();
        self.current = Some(token.clone());
        let generation = self.generation;

        self.state.send_replace(PollState {
            execution_id: Some(execution_id.to_string()),
            status: ExecutionStatus::Running,
            ..PollState::idle(generation, self.progress_ceiling)
        });
        info!("Polling execution {} every {:?}", execution_id, self.interval);

        tokio::spawn(poll_loop(
            self.source.clone(),
            execution_id.to_string(),
            generation,
            self.interval,
            token,
            self.state.clone(),
        ))
    }

    /// Drop the current target. Nothing scheduled for it will be fetched or
    /// applied afterwards.
    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
        self.generation += 1;
        self.state
            .send_replace(PollState::idle(self.generation, self.progress_ceiling));
    }
}

impl Drop for ExecutionPoller {
    fn drop(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }
}

async fn poll_loop(
    source: Arc<dyn StatusSource>,
    execution_id: String,
    generation: u64,
    interval: Duration,
    token: CancellationToken,
    state: watch::Sender<PollState>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            _ = token.cancelled() => break,
            fetched = source.fetch_status(&execution_id) => fetched,
        };

        let view = match fetched {
            Ok(view) => view,
            Err(e) => {
                // No retry or backoff: the next tick simply asks again.
                warn!("Status fetch for {} failed: {}", execution_id, e);
                continue;
            }
        };

        let mut results = view.results.clone();
        if view.status == ExecutionStatus::Succeeded && results.is_none() {
            let fetched = tokio::select! {
                _ = token.cancelled() => break,
                fetched = source.fetch_results(&execution_id) => fetched,
            };
            results = match fetched {
                Ok(items) => Some(items),
                Err(e) => {
                    warn!("Results fetch for {} failed: {}", execution_id, e);
                    Some(Vec::new())
                }
            };
        }

        let step = rand::random::<f64>() * 10.0;
        let applied = state.send_if_modified(|current| {
            if current.generation != generation || token.is_cancelled() {
                return false;
            }
            apply_view(current, &view, results, step);
            true
        });

        if !applied {
            debug!("Dropping stale status for {}", execution_id);
            break;
        }
        if view.status.is_terminal() {
            info!("Execution {} finished: {}", execution_id, view.status);
            break;
        }
    }
}

fn apply_view(current: &mut PollState, view: &StatusView, results: Option<Vec<Value>>, step: f64) {
    if current.status.is_terminal() {
        return;
    }
    if current.status.can_transition_to(view.status) {
        current.status = view.status;
    }
    current.stats = view.stats.clone();
    current.started_at = Some(view.started_at);
    current.finished_at = view.finished_at;
    match current.status {
        ExecutionStatus::Succeeded => {
            current.results = results;
            current.progress.complete();
        }
        ExecutionStatus::Running | ExecutionStatus::Ready => current.progress.advance(step),
        ExecutionStatus::Failed => {}
    }
}
