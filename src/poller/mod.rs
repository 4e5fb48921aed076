#![forbid(unsafe_code)]

//! Per-task status polling.
//!
//! Every non-terminal row on the board gets at most one loop. A loop fetches
//! the task status, applies it to the board, then sleeps for the interval
//! before the next fetch, so there is never more than one request in flight
//! per task. Loops are cancelled through a [`CancellationToken`]; the token is
//! re-checked under the board lock right before any write, which is what
//! makes [`Poller::stop_polling`] a hard barrier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::TaskApi;
use crate::api::types::{FollowUpRequest, FollowUpStarted};
use crate::board::{self, MergeOutcome, PreviewContent, SharedBoard};
use crate::error::{ApiError, ScanwatchError};
use crate::task::model::TaskStatus;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(3000);

const STOP_FAILED: &str = "Could not stop task.";
const STOP_TRANSPORT_FAILED: &str = "An error occurred while stopping the task.";

#[derive(Debug)]
struct LoopHandle {
    generation: u64,
    token: CancellationToken,
}

struct Inner {
    api: Arc<dyn TaskApi>,
    board: SharedBoard,
    interval: Duration,
    loops: Mutex<HashMap<String, LoopHandle>>,
    next_generation: AtomicU64,
    root: CancellationToken,
}

impl Inner {
    fn loops(&self) -> MutexGuard<'_, HashMap<String, LoopHandle>> {
        self.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the registry entry only if it still belongs to `generation`.
    fn forget(&self, task_id: &str, generation: u64) {
        let mut loops = self.loops();
        if loops.get(task_id).is_some_and(|h| h.generation == generation) {
            loops.remove(task_id);
        }
    }
}

#[derive(Clone)]
pub struct Poller {
    inner: Arc<Inner>,
}

impl Poller {
    pub fn new(api: Arc<dyn TaskApi>, board: SharedBoard, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                board,
                interval,
                loops: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                root: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn board(&self) -> &SharedBoard {
        &self.inner.board
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Starts the poll loop for a row on the board.
    ///
    /// Returns `Ok(false)` when a loop already exists or the row is already
    /// terminal. Must be called from within a tokio runtime.
    pub fn start_polling(&self, task_id: &str) -> Result<bool, ScanwatchError> {
        if task_id.trim().is_empty() {
            return Err(ScanwatchError::EmptyTaskId);
        }
        let status = board::lock(&self.inner.board)
            .row(task_id)
            .map(|r| r.status())
            .ok_or_else(|| ScanwatchError::RowDetached(task_id.to_owned()))?;
        if status.is_terminal() {
            debug!(task_id, %status, "not polling terminal task");
            return Ok(false);
        }

        let mut loops = self.inner.loops();
        if loops.contains_key(task_id) {
            return Ok(false);
        }
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.root.child_token();
        loops.insert(
            task_id.to_owned(),
            LoopHandle {
                generation,
                token: token.clone(),
            },
        );
        drop(loops);

        debug!(task_id, generation, "poll loop started");
        tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            task_id.to_owned(),
            generation,
            token,
        ));
        Ok(true)
    }

    /// Starts loops for every non-terminal row; returns how many were new.
    pub fn start_all(&self) -> usize {
        let ids = board::lock(&self.inner.board).pollable_ids();
        ids.iter()
            .filter(|id| matches!(self.start_polling(id), Ok(true)))
            .count()
    }

    /// Cancels the loop for `task_id`. No board write attributed to that loop
    /// happens after this returns.
    pub fn stop_polling(&self, task_id: &str) -> bool {
        let Some(handle) = self.inner.loops().remove(task_id) else {
            return false;
        };
        handle.token.cancel();
        // A loop that passed its token check is mid-write; wait it out.
        drop(board::lock(&self.inner.board));
        debug!(task_id, generation = handle.generation, "poll loop stopped");
        true
    }

    #[must_use]
    pub fn is_polling(&self, task_id: &str) -> bool {
        self.inner.loops().contains_key(task_id)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.loops().len()
    }

    /// Asks the server to stop a task and updates the row optimistically.
    ///
    /// Failures restore the stop control, set the board alert and are
    /// returned to the caller.
    pub async fn request_stop(&self, task_id: &str) -> Result<String, ScanwatchError> {
        if task_id.trim().is_empty() {
            return Err(ScanwatchError::EmptyTaskId);
        }
        {
            let mut b = board::lock(&self.inner.board);
            if !b.contains(task_id) {
                return Err(ScanwatchError::RowDetached(task_id.to_owned()));
            }
            if !b.begin_stop(task_id) {
                return Err(ScanwatchError::NotStoppable(task_id.to_owned()));
            }
        }

        match self.inner.api.stop_task(task_id).await {
            Ok(message) => {
                self.stop_polling(task_id);
                let mut b = board::lock(&self.inner.board);
                b.apply_status(task_id, TaskStatus::Stopped);
                b.settle_stop(task_id);
                if b.row(task_id).is_some_and(|r| r.status() == TaskStatus::Stopped) {
                    b.show_in_preview(task_id, PreviewContent::Placeholder(TaskStatus::Stopped));
                }
                info!(task_id, %message, "task stopped");
                Ok(message)
            }
            Err(e) => {
                let alert = stop_failure_alert(&e);
                warn!(task_id, error = %e, "stop request failed");
                let mut b = board::lock(&self.inner.board);
                b.settle_stop(task_id);
                b.set_alert(alert);
                Err(e.into())
            }
        }
    }

    /// [`Poller::request_stop`] for fire-and-forget callers: every failure
    /// ends up in the board alert. Returns whether the task was stopped.
    pub async fn stop_with_alert(&self, task_id: &str) -> bool {
        match self.request_stop(task_id).await {
            Ok(_) => true,
            // Already alerted by `request_stop`.
            Err(ScanwatchError::Api(_)) => false,
            Err(e) => {
                warn!(task_id, error = %e, "stop not sent");
                board::lock(&self.inner.board).set_alert(e.to_string());
                false
            }
        }
    }

    /// Binds the preview to `task_id` and loads it in place.
    pub async fn open_preview(&self, task_id: &str) -> Result<(), ScanwatchError> {
        if !board::lock(&self.inner.board).open_preview(task_id) {
            return Err(ScanwatchError::RowDetached(task_id.to_owned()));
        }
        load_preview(&self.inner, task_id).await;
        Ok(())
    }

    /// Opens the preview for `task_id`, or closes it when it already shows
    /// that task. The fetch runs in the background; its handle is returned.
    pub fn toggle_preview(&self, task_id: &str) -> Result<Option<JoinHandle<()>>, ScanwatchError> {
        {
            let mut b = board::lock(&self.inner.board);
            if b.preview().is_bound_to(task_id) {
                b.close_preview();
                return Ok(None);
            }
            if !b.open_preview(task_id) {
                return Err(ScanwatchError::RowDetached(task_id.to_owned()));
            }
        }
        let inner = Arc::clone(&self.inner);
        let id = task_id.to_owned();
        Ok(Some(tokio::spawn(async move {
            load_preview(&inner, &id).await;
        })))
    }

    pub fn close_preview(&self) {
        board::lock(&self.inner.board).close_preview();
    }

    /// Re-reads the task list and reconciles the board and the loops with it.
    pub async fn refresh_rows(&self) -> Result<MergeOutcome, ScanwatchError> {
        let tasks = self.inner.api.list_tasks().await?;
        let (outcome, finished) = {
            let mut b = board::lock(&self.inner.board);
            let outcome = b.merge(&tasks);
            let finished: Vec<String> = self
                .inner
                .loops()
                .keys()
                .filter(|id| b.row(id).is_some_and(|r| r.status().is_terminal()))
                .cloned()
                .collect();
            (outcome, finished)
        };

        for id in outcome.removed.iter().chain(&finished) {
            self.stop_polling(id);
        }
        let started = self.start_all();
        info!(
            added = outcome.added.len(),
            removed = outcome.removed.len(),
            started,
            "task list refreshed"
        );
        Ok(outcome)
    }

    /// Queues a follow-up scan and pulls the new task onto the board.
    ///
    /// A failed refresh afterwards is only logged; the follow-up itself
    /// already succeeded.
    pub async fn start_follow_up(
        &self,
        req: &FollowUpRequest,
    ) -> Result<FollowUpStarted, ScanwatchError> {
        let started = self.inner.api.run_follow_up(req).await?;
        info!(
            task_id = %started.task_id,
            action = %req.action_id,
            source_task = %req.original_nmap_task_id,
            "follow-up queued"
        );
        if let Err(e) = self.refresh_rows().await {
            warn!(error = %e, "refresh after follow-up failed");
        }
        Ok(started)
    }

    /// Cancels every loop, including ones started concurrently with this call.
    pub fn shutdown(&self) {
        self.inner.root.cancel();
        let dropped = std::mem::take(&mut *self.inner.loops());
        drop(board::lock(&self.inner.board));
        debug!(loops = dropped.len(), "poller shut down");
    }
}

pub(crate) fn stop_failure_alert(err: &ApiError) -> String {
    if err.is_transport() {
        return STOP_TRANSPORT_FAILED.to_owned();
    }
    match err {
        ApiError::Rejected(msg) if !msg.trim().is_empty() => msg.clone(),
        _ => STOP_FAILED.to_owned(),
    }
}

async fn load_preview(inner: &Inner, task_id: &str) {
    let fetched = inner.api.task_status(task_id).await;
    let mut b = board::lock(&inner.board);
    match fetched {
        Ok(report) => {
            b.update_preview(task_id, &report);
        }
        Err(e) => {
            warn!(task_id, error = %e, "preview fetch failed");
            b.show_in_preview(task_id, PreviewContent::Error);
        }
    }
}

enum Tick {
    Continue,
    Terminal { preview_bound: bool },
    Halt,
}

async fn run_loop(inner: Arc<Inner>, task_id: String, generation: u64, token: CancellationToken) {
    loop {
        let fetched = tokio::select! {
            biased;
            () = token.cancelled() => break,
            r = inner.api.task_status(&task_id) => r,
        };

        let tick = {
            let mut b = board::lock(&inner.board);
            if token.is_cancelled() {
                break;
            }
            match fetched {
                Ok(report) => {
                    b.clear_poll_error(&task_id);
                    if let Some(change) = b.apply_status(&task_id, report.status) {
                        info!(task_id = %task_id, from = %change.from, to = %change.to, "status changed");
                    }
                    b.update_preview(&task_id, &report);
                    match b.row(&task_id).map(|r| r.status()) {
                        None => Tick::Halt,
                        Some(s) if s.is_terminal() => Tick::Terminal {
                            preview_bound: b.preview().is_bound_to(&task_id),
                        },
                        Some(_) => Tick::Continue,
                    }
                }
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "status poll failed");
                    b.mark_poll_error(&task_id, e.to_string());
                    b.show_in_preview(&task_id, PreviewContent::Error);
                    Tick::Halt
                }
            }
        };

        match tick {
            Tick::Continue => {}
            Tick::Halt => break,
            Tick::Terminal { preview_bound } => {
                if preview_bound {
                    final_preview(&inner, &task_id, &token).await;
                }
                break;
            }
        }

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = tokio::time::sleep(inner.interval) => {}
        }
    }

    inner.forget(&task_id, generation);
    debug!(task_id = %task_id, generation, "poll loop exited");
}

/// One more fetch after a terminal status so the preview shows final output.
async fn final_preview(inner: &Inner, task_id: &str, token: &CancellationToken) {
    let fetched = tokio::select! {
        biased;
        () = token.cancelled() => return,
        r = inner.api.task_status(task_id) => r,
    };
    let mut b = board::lock(&inner.board);
    if token.is_cancelled() {
        return;
    }
    match fetched {
        Ok(report) => {
            b.update_preview(task_id, &report);
        }
        Err(e) => {
            warn!(task_id, error = %e, "final preview fetch failed");
            b.show_in_preview(task_id, PreviewContent::Error);
        }
    }
}
