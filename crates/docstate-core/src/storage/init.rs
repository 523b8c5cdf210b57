//! Lazy one-shot initialization with request coalescing.
//!
//! The first caller of [`InitGate::ensure`] runs the provisioning future;
//! callers arriving while it runs park on a oneshot channel and receive the
//! same outcome. The mutex guarding the state is never held across an await.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use docstate_types::config::InitFailurePolicy;
use docstate_types::error::StorageError;
use tokio::sync::oneshot;

type Waiter = oneshot::Sender<Result<(), StorageError>>;

enum InitState {
    Unset,
    InProgress { waiters: Vec<Waiter> },
    Succeeded,
    Failed(StorageError),
}

/// Point-in-time view of an [`InitGate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitStatus {
    Unset,
    InProgress { waiters: usize },
    Succeeded,
    Failed(StorageError),
}

impl std::fmt::Display for InitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitStatus::Unset => f.write_str("unset"),
            InitStatus::InProgress { waiters } => write!(f, "in progress ({waiters} waiting)"),
            InitStatus::Succeeded => f.write_str("succeeded"),
            InitStatus::Failed(err) => write!(f, "failed: {}", err.message()),
        }
    }
}

/// Per-coordinator initialization state machine.
///
/// `Unset -> InProgress -> Succeeded | Failed`. Under
/// [`InitFailurePolicy::Retry`] a failure returns the gate to `Unset`, so
/// only the callers that were waiting on that attempt see the error.
pub struct InitGate {
    state: Mutex<InitState>,
    policy: InitFailurePolicy,
}

enum Role {
    Initiator,
    Waiter(oneshot::Receiver<Result<(), StorageError>>),
}

impl InitGate {
    pub fn new(policy: InitFailurePolicy) -> Self {
        Self {
            state: Mutex::new(InitState::Unset),
            policy,
        }
    }

    pub fn policy(&self) -> InitFailurePolicy {
        self.policy
    }

    pub fn status(&self) -> InitStatus {
        match &*self.lock() {
            InitState::Unset => InitStatus::Unset,
            InitState::InProgress { waiters } => InitStatus::InProgress {
                waiters: waiters.len(),
            },
            InitState::Succeeded => InitStatus::Succeeded,
            InitState::Failed(err) => InitStatus::Failed(err.clone()),
        }
    }

    /// Resolve once initialization has settled, running `provision` if this
    /// caller is the one that starts it.
    ///
    /// If the initiating future is dropped before settling, the gate returns
    /// to `Unset` and parked callers race to become the next initiator.
    pub async fn ensure<F, Fut>(&self, provision: F) -> Result<(), StorageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StorageError>>,
    {
        loop {
            let role = {
                let mut state = self.lock();
                let role = match &mut *state {
                    InitState::Succeeded => return Ok(()),
                    InitState::Failed(err) => return Err(err.clone()),
                    InitState::InProgress { waiters } => {
                        let (tx, rx) = oneshot::channel();
                        waiters.push(tx);
                        Role::Waiter(rx)
                    }
                    InitState::Unset => Role::Initiator,
                };
                if matches!(role, Role::Initiator) {
                    *state = InitState::InProgress {
                        waiters: Vec::new(),
                    };
                }
                role
            };

            match role {
                Role::Waiter(rx) => match rx.await {
                    Ok(outcome) => return outcome,
                    Err(_) => {
                        tracing::debug!("initializer dropped before settling, retrying");
                        continue;
                    }
                },
                Role::Initiator => {
                    let guard = SettleGuard {
                        gate: self,
                        settled: false,
                    };
                    let outcome = provision().await;
                    guard.settle(&outcome);
                    return outcome;
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, InitState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Settles the gate exactly once; on drop without settling, resets it.
struct SettleGuard<'a> {
    gate: &'a InitGate,
    settled: bool,
}

impl SettleGuard<'_> {
    fn settle(mut self, outcome: &Result<(), StorageError>) {
        self.settled = true;
        let next = match outcome {
            Ok(()) => InitState::Succeeded,
            Err(err) if self.gate.policy == InitFailurePolicy::Sticky => {
                InitState::Failed(err.clone())
            }
            Err(_) => InitState::Unset,
        };

        let waiters = {
            let mut state = self.gate.lock();
            match std::mem::replace(&mut *state, next) {
                InitState::InProgress { waiters } => waiters,
                _ => Vec::new(),
            }
        };

        for waiter in waiters {
            // Receiver gone means that caller was dropped; nothing to deliver.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.gate.lock();
        if matches!(*state, InitState::InProgress { .. }) {
            // Dropping the senders wakes every waiter with a RecvError.
            *state = InitState::Unset;
        }
    }
}
