//! Walk Driver
//!
//! Evaluates every vertex of a graph for one operation, in parallel where
//! the ordering constraints allow.
//!
//! # How It Works
//!
//! 1. The graph's [`Schedule`] for the operation gives, per vertex, the
//!    vertices it waits on. Vertices waiting on nothing start `Ready`.
//! 2. A single dispatcher loop owns every vertex state. It spawns one task
//!    per ready vertex into a [`JoinSet`] and waits for completions.
//! 3. Each task first acquires a permit from a [`Semaphore`] sized by
//!    `parallelism`, then runs the vertex's filtered eval tree on the
//!    blocking pool.
//! 4. A completion releases the vertices waiting on it; a vertex becomes
//!    `Ready` once everything it waits on has finished.
//!
//! # Failures
//!
//! What happens to the dependents of a failed vertex depends on the
//! [`ErrorPolicy`]: they are skipped (`Propagate`), run anyway
//! (`Continue`), or the whole walk stops dispatching (`FailFast`). A task
//! that panics, while building or running its eval tree, fails its vertex
//! with [`EvalError::Panicked`].
//!
//! # Cancellation
//!
//! Cancelling the walker's token stops dispatch at once. Tasks still
//! waiting for a permit give up; tasks already evaluating run to
//! completion. Vertices that never started are reported as skipped.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{ErrorPolicy, WalkOptions};
use crate::error::{EvalError, VertexFailure, WalkError};
use crate::eval::{EvalContext, WalkOperation};
use crate::graph::{Graph, Schedule, VertexId};
use crate::vertex;

/// Why a vertex never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DependencyFailed,
    Cancelled,
}

/// Lifecycle of a vertex within one walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexState {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
    Skipped(SkipReason),
}

impl VertexState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            VertexState::Done | VertexState::Failed | VertexState::Skipped(_)
        )
    }
}

impl fmt::Display for VertexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VertexState::Pending => f.write_str("pending"),
            VertexState::Ready => f.write_str("ready"),
            VertexState::Running => f.write_str("running"),
            VertexState::Done => f.write_str("done"),
            VertexState::Failed => f.write_str("failed"),
            VertexState::Skipped(SkipReason::DependencyFailed) => {
                f.write_str("skipped (dependency failed)")
            }
            VertexState::Skipped(SkipReason::Cancelled) => f.write_str("skipped (cancelled)"),
        }
    }
}

/// Final state of one vertex.
#[derive(Debug, Clone, Copy)]
pub struct VertexOutcome {
    pub state: VertexState,
    /// Proxies do no real work and are left out of [`WalkResult::evaluated`].
    pub proxy: bool,
    pub started: Option<Instant>,
    pub finished: Option<Instant>,
}

impl VertexOutcome {
    pub fn duration(&self) -> Option<Duration> {
        Some(self.finished?.saturating_duration_since(self.started?))
    }
}

/// Everything a walk produced.
#[derive(Debug)]
pub struct WalkResult {
    pub operation: WalkOperation,
    /// Per-vertex outcomes, in graph order.
    pub outcomes: IndexMap<String, VertexOutcome>,
    pub failures: Vec<VertexFailure>,
    /// The walk was cancelled from outside.
    pub cancelled: bool,
    pub elapsed: Duration,
    /// The evaluation context, for extracting state, diffs and outputs.
    pub context: Arc<EvalContext>,
}

impl WalkResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn state(&self, name: &str) -> Option<VertexState> {
        self.outcomes.get(name).map(|outcome| outcome.state)
    }

    /// Names of non-proxy vertices that finished evaluating.
    pub fn evaluated(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.state == VertexState::Done && !outcome.proxy)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Number of vertices that finished, proxies included.
    pub fn completed(&self) -> usize {
        self.outcomes
            .values()
            .filter(|outcome| outcome.state == VertexState::Done)
            .count()
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome.state, VertexState::Skipped(_)))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The context if the walk succeeded, the aggregate error otherwise.
    pub fn into_result(self) -> Result<Arc<EvalContext>, WalkError> {
        if !self.failures.is_empty() {
            return Err(WalkError::Failed {
                operation: self.operation,
                failures: self.failures,
            });
        }
        if self.cancelled {
            return Err(WalkError::Cancelled {
                operation: self.operation,
                completed: self.completed(),
                skipped: self.skipped().into_iter().map(String::from).collect(),
            });
        }
        Ok(self.context)
    }
}

/// Walks a graph.
#[derive(Debug, Clone)]
pub struct Walker {
    graph: Arc<Graph>,
    options: WalkOptions,
    cancel: CancellationToken,
}

impl Walker {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            options: WalkOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an existing token, e.g. one shared with other walkers.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this walker's walks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Run `op` over the whole graph.
    #[tracing::instrument(name = "walk", skip_all, fields(operation = %op))]
    pub async fn walk(&self, op: WalkOperation, ctx: EvalContext) -> WalkResult {
        let start = Instant::now();
        let ctx = Arc::new(ctx);
        let cancel = self.cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.options.parallelism()));
        let mut dispatch = Dispatch::new(&self.graph, self.graph.schedule(op));
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let mut running: HashMap<task::Id, VertexId> = HashMap::new();

        tracing::info!(
            vertices = self.graph.len(),
            parallelism = self.options.parallelism(),
            "starting walk"
        );

        loop {
            if !cancel.is_cancelled() {
                while let Some(id) = dispatch.ready.pop_front() {
                    dispatch.states.insert(id, VertexState::Running);
                    let task_id = self.spawn(&mut tasks, id, op, &ctx, &semaphore, &cancel);
                    running.insert(task_id, id);
                }
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };
            let outcome = match joined {
                Ok((task_id, outcome)) => {
                    running.remove(&task_id);
                    outcome
                }
                Err(err) => {
                    let Some(id) = running.remove(&err.id()) else {
                        tracing::error!(error = %err, "unknown vertex task could not be joined");
                        continue;
                    };
                    TaskOutcome {
                        id,
                        timing: None,
                        result: TaskResult::Failed(EvalError::Panicked(panic_message(err))),
                    }
                }
            };

            let id = outcome.id;
            let name = self.graph.name(id).to_string();
            if let Some(timing) = outcome.timing {
                dispatch.timings.insert(id, timing);
            }

            match outcome.result {
                TaskResult::Done => {
                    tracing::debug!(vertex = %name, "vertex finished");
                    dispatch.states.insert(id, VertexState::Done);
                    dispatch.release(id);
                }
                TaskResult::Failed(error) => {
                    tracing::warn!(vertex = %name, %error, "vertex failed");
                    dispatch.states.insert(id, VertexState::Failed);
                    dispatch.failures.push(VertexFailure {
                        vertex: name,
                        error,
                    });
                    match self.options.error_policy {
                        ErrorPolicy::Continue => dispatch.release(id),
                        ErrorPolicy::Propagate => dispatch.skip_dependents(id),
                        ErrorPolicy::FailFast => {
                            dispatch.skip_dependents(id);
                            cancel.cancel();
                        }
                    }
                }
                TaskResult::Cancelled => {
                    dispatch
                        .states
                        .insert(id, VertexState::Skipped(SkipReason::Cancelled));
                }
            }
        }

        let cancelled = self.cancel.is_cancelled();
        dispatch.settle(cancel.is_cancelled());

        let result = WalkResult {
            operation: op,
            outcomes: dispatch.outcomes(),
            failures: dispatch.failures,
            cancelled,
            elapsed: start.elapsed(),
            context: ctx,
        };
        tracing::info!(
            completed = result.completed(),
            failed = result.failures.len(),
            skipped = result.skipped().len(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "walk finished"
        );
        result
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<TaskOutcome>,
        id: VertexId,
        op: WalkOperation,
        ctx: &Arc<EvalContext>,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> task::Id {
        let node = self.graph.vertex(id).map(Arc::clone);
        let span = tracing::debug_span!("vertex", name = %self.graph.name(id));
        let ctx = Arc::clone(ctx);
        let semaphore = Arc::clone(semaphore);
        let cancel = cancel.clone();

        let work = async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                return TaskOutcome {
                    id,
                    timing: None,
                    result: TaskResult::Cancelled,
                };
            };

            tracing::debug!("vertex started");
            let started = Instant::now();
            let tree = node
                .map(|v| vertex::eval_tree(v.as_ref(), op))
                .unwrap_or_default();
            let result = if tree.is_noop() {
                Ok(())
            } else {
                match task::spawn_blocking(move || tree.eval(&ctx, op)).await {
                    Ok(result) => result,
                    Err(err) => Err(EvalError::Panicked(panic_message(err))),
                }
            };
            let finished = Instant::now();

            TaskOutcome {
                id,
                timing: Some((started, finished)),
                result: match result {
                    Ok(()) => TaskResult::Done,
                    Err(error) => TaskResult::Failed(error),
                },
            }
        };
        tasks.spawn(work.instrument(span)).id()
    }
}

struct TaskOutcome {
    id: VertexId,
    timing: Option<(Instant, Instant)>,
    result: TaskResult,
}

enum TaskResult {
    Done,
    Failed(EvalError),
    Cancelled,
}

/// Dispatcher bookkeeping; owned by the walk loop only.
struct Dispatch<'a> {
    graph: &'a Graph,
    schedule: Schedule,
    states: IndexMap<VertexId, VertexState>,
    waiting: HashMap<VertexId, usize>,
    ready: VecDeque<VertexId>,
    timings: HashMap<VertexId, (Instant, Instant)>,
    failures: Vec<VertexFailure>,
}

impl<'a> Dispatch<'a> {
    fn new(graph: &'a Graph, schedule: Schedule) -> Self {
        let mut states = IndexMap::new();
        let mut waiting = HashMap::new();
        let mut ready = VecDeque::new();

        for &id in schedule.vertices() {
            let degree = schedule.in_degree(id);
            waiting.insert(id, degree);
            if degree == 0 {
                states.insert(id, VertexState::Ready);
                ready.push_back(id);
            } else {
                states.insert(id, VertexState::Pending);
            }
        }

        Self {
            graph,
            schedule,
            states,
            waiting,
            ready,
            timings: HashMap::new(),
            failures: Vec::new(),
        }
    }

    /// `id` finished; start whatever was only waiting on it.
    fn release(&mut self, id: VertexId) {
        for next in self.schedule.unblocks(id) {
            let Some(count) = self.waiting.get_mut(&next) else {
                continue;
            };
            *count = count.saturating_sub(1);
            if *count == 0 && self.states.get(&next) == Some(&VertexState::Pending) {
                self.states.insert(next, VertexState::Ready);
                self.ready.push_back(next);
            }
        }
    }

    /// Skip every transitive dependent of a failed vertex.
    fn skip_dependents(&mut self, id: VertexId) {
        let mut stack: Vec<VertexId> = self.schedule.unblocks(id).collect();
        while let Some(next) = stack.pop() {
            if self.states.get(&next) != Some(&VertexState::Pending) {
                continue;
            }
            tracing::debug!(vertex = self.graph.name(next), "skipping dependent of failed vertex");
            self.states
                .insert(next, VertexState::Skipped(SkipReason::DependencyFailed));
            stack.extend(self.schedule.unblocks(next));
        }
    }

    /// Resolve vertices the loop never finished.
    fn settle(&mut self, cancelled: bool) {
        for (&id, state) in self.states.iter_mut() {
            if state.is_terminal() {
                continue;
            }
            if cancelled {
                *state = VertexState::Skipped(SkipReason::Cancelled);
            } else {
                *state = VertexState::Failed;
                let name = self.graph.name(id).to_string();
                self.failures.push(VertexFailure {
                    error: EvalError::Unschedulable(format!(
                        "{name} waits on vertices that never finished"
                    )),
                    vertex: name,
                });
            }
        }
    }

    fn outcomes(&self) -> IndexMap<String, VertexOutcome> {
        self.states
            .iter()
            .map(|(&id, &state)| {
                let timing = self.timings.get(&id);
                let proxy = self
                    .graph
                    .vertex(id)
                    .is_some_and(|v| vertex::is_proxy(v.as_ref()));
                (
                    self.graph.name(id).to_string(),
                    VertexOutcome {
                        state,
                        proxy,
                        started: timing.map(|t| t.0),
                        finished: timing.map(|t| t.1),
                    },
                )
            })
            .collect()
    }
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string()),
        Err(err) => err.to_string(),
    }
}
