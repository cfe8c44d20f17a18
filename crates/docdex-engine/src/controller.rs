//! Debounced, single-flight build scheduling.
//!
//! The controller coalesces bursts of change notifications into a minimal
//! sequence of builds: at most one build runs at a time, at most one more
//! is queued, and a burst of schedule requests triggers a single build
//! after the debounce delay elapses.

use crate::EngineError;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error};

/// The build invoked by the controller.
pub type BuildFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), EngineError>> + Send + Sync>;

/// Hook invoked when a build fails; the failure never crashes the scheduler.
pub type ErrorFn = Arc<dyn Fn(&EngineError) + Send + Sync>;

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Nothing running, nothing pending
    Idle,
    /// A schedule request is waiting out the debounce delay
    Debouncing,
    /// A build is executing
    Building,
    /// A build is executing and another is queued behind it
    BuildQueued,
}

/// Options for the controller.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Debounce delay between the last schedule request and the build
    pub debounce: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

struct StateCell {
    state: BuildState,
    /// Bumped on every (re)schedule so stale debounce timers abandon.
    epoch: u64,
}

struct Inner {
    cell: Mutex<StateCell>,
    state_tx: watch::Sender<BuildState>,
    build_fn: BuildFn,
    on_error: Option<ErrorFn>,
    debounce: Duration,
}

impl Inner {
    /// Transition under the lock and publish the new state.
    fn transition(&self, f: impl FnOnce(&mut StateCell)) -> BuildState {
        let mut cell = self.cell.lock();
        f(&mut cell);
        let state = cell.state;
        self.state_tx.send_replace(state);
        state
    }
}

/// Debounced single-flight build scheduler.
///
/// Must be used from within a tokio runtime; `schedule` spawns the debounce
/// timer and the build task.
pub struct BuildController {
    inner: Arc<Inner>,
}

impl BuildController {
    /// Create a controller around a build function.
    pub fn new(build_fn: BuildFn, on_error: Option<ErrorFn>, options: ControllerOptions) -> Self {
        let (state_tx, _) = watch::channel(BuildState::Idle);
        Self {
            inner: Arc::new(Inner {
                cell: Mutex::new(StateCell {
                    state: BuildState::Idle,
                    epoch: 0,
                }),
                state_tx,
                build_fn,
                on_error,
                debounce: options.debounce,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> BuildState {
        self.inner.cell.lock().state
    }

    /// Request a build.
    ///
    /// While idle or debouncing this (re)starts the debounce timer - only
    /// the last request in a burst triggers a build. While a build runs, at
    /// most one extra build is queued no matter how many requests arrive.
    pub fn schedule(&self) {
        let inner = self.inner.clone();
        let mut cell = inner.cell.lock();
        match cell.state {
            BuildState::Idle | BuildState::Debouncing => {
                cell.state = BuildState::Debouncing;
                cell.epoch += 1;
                let epoch = cell.epoch;
                inner.state_tx.send_replace(BuildState::Debouncing);
                drop(cell);

                let timer_inner = inner.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(timer_inner.debounce).await;

                    let fire = {
                        let mut cell = timer_inner.cell.lock();
                        if cell.state == BuildState::Debouncing && cell.epoch == epoch {
                            cell.state = BuildState::Building;
                            timer_inner.state_tx.send_replace(BuildState::Building);
                            true
                        } else {
                            false // superseded by a later request
                        }
                    };

                    if fire {
                        run_builds(timer_inner).await;
                    }
                });
            }
            BuildState::Building => {
                cell.state = BuildState::BuildQueued;
                inner.state_tx.send_replace(BuildState::BuildQueued);
                debug!("Build queued behind the active one");
            }
            BuildState::BuildQueued => {
                // Already queued; further requests are no-ops.
            }
        }
    }

    /// Resolve once the controller is idle with no pending timer.
    ///
    /// Resolves immediately when already idle, otherwise exactly once after
    /// the state machine next reaches idle.
    pub async fn wait_for_idle(&self) {
        let mut rx = self.inner.state_tx.subscribe();
        let _ = rx.wait_for(|s| *s == BuildState::Idle).await;
    }
}

/// Run the build, then any queued build, until the queue drains.
///
/// A queued build starts immediately - the debounce delay applies only to
/// requests arriving while idle.
async fn run_builds(inner: Arc<Inner>) {
    loop {
        let result = (inner.build_fn)().await;
        if let Err(e) = &result {
            error!(error = %e, "Build failed");
            if let Some(hook) = &inner.on_error {
                hook(e);
            }
        }

        let queued = {
            let mut cell = inner.cell.lock();
            if cell.state == BuildState::BuildQueued {
                cell.state = BuildState::Building;
                inner.state_tx.send_replace(BuildState::Building);
                true
            } else {
                cell.state = BuildState::Idle;
                inner.state_tx.send_replace(BuildState::Idle);
                false
            }
        };

        if !queued {
            break;
        }
    }
}
