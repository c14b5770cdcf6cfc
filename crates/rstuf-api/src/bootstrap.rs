//! Bootstrap lifecycle coordinator
//!
//! The `BOOTSTRAP` setting is a lock with four observable states: absent,
//! `pre-<id>` (a bootstrap was accepted and handed to the worker),
//! `signing-<id>` (the worker waits for offline signatures) and the bare id
//! (finished). The coordinator owns the absent → pre transition and its
//! rollback; the worker drives everything after that.
//!
//! Acquisition is a compare-and-set against the value that was read, so two
//! concurrent `POST /bootstrap` requests cannot both take the lock.

use rstuf_core::bootstrap::pre_lock_value;
use rstuf_core::payload::BootstrapPayload;
use rstuf_core::roles::BOOTSTRAP_KEY;
use rstuf_core::{BootstrapState, TaskAction, TaskId, TaskState};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::broker::{BrokerError, TaskDispatcher};
use crate::settings::{SettingsError, SettingsStore};

#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// A bootstrap exists or is being acquired
    #[error("System already has a Metadata. State: {}", .0.describe())]
    Conflict(BootstrapState),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Failed to encode bootstrap payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How a supervised bootstrap ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionOutcome {
    /// The worker reported success and owns the lock from here on
    Succeeded,
    /// The worker gave up; the lock was released
    Failed(TaskState),
    /// The deadline passed; the task was revoked and the lock released
    TimedOut,
    /// The store or broker failed; supervision stopped and the lock was left as is
    Aborted(String),
}

#[derive(Debug, Clone)]
pub struct BootstrapCoordinator {
    settings: Arc<SettingsStore>,
    dispatcher: Arc<TaskDispatcher>,
    poll_interval: Duration,
}

impl BootstrapCoordinator {
    pub fn new(
        settings: Arc<SettingsStore>,
        dispatcher: Arc<TaskDispatcher>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            settings,
            dispatcher,
            poll_interval,
        }
    }

    pub async fn state(&self) -> Result<BootstrapState, SettingsError> {
        self.settings.bootstrap_state().await
    }

    /// Take the lock for `task_id`
    ///
    /// Fails with `Conflict` when a bootstrap exists, is being acquired, or
    /// another caller won the race.
    pub async fn pre_lock(&self, task_id: &TaskId) -> Result<(), CoordinatorError> {
        let raw = self.settings.bootstrap_raw().await?;
        let state = BootstrapState::from_setting(raw.as_ref().and_then(Value::as_str));
        if state.is_locked() {
            warn!(state = %state.describe(), "Rejected bootstrap: lock is held");
            return Err(CoordinatorError::Conflict(state));
        }

        let lock = Value::String(pre_lock_value(task_id.as_str()));
        if !self
            .settings
            .compare_and_set(BOOTSTRAP_KEY, raw.as_ref(), Some(lock))
            .await?
        {
            let state = self.state().await?;
            warn!(task_id = %task_id, state = %state.describe(), "Lost bootstrap lock race");
            return Err(CoordinatorError::Conflict(state));
        }

        info!(task_id = %task_id, "Acquired bootstrap lock");
        Ok(())
    }

    /// Release the lock taken for `task_id`
    ///
    /// Does nothing once the worker has moved the lock past `pre`. Returns
    /// whether the lock was released.
    pub async fn release_lock(&self, task_id: &TaskId) -> Result<bool, SettingsError> {
        let held = Value::String(pre_lock_value(task_id.as_str()));
        let released = self
            .settings
            .compare_and_set(BOOTSTRAP_KEY, Some(&held), None)
            .await?;
        if released {
            info!(task_id = %task_id, "Released bootstrap lock");
        } else {
            warn!(task_id = %task_id, "Bootstrap lock no longer held by task; left in place");
        }
        Ok(released)
    }

    /// Lock, dispatch and start supervising a bootstrap
    pub async fn begin_bootstrap(
        &self,
        payload: &BootstrapPayload,
    ) -> Result<(TaskId, JoinHandle<SupervisionOutcome>), CoordinatorError> {
        let task_id = TaskId::generate();
        self.pre_lock(&task_id).await?;

        let dispatched = match serde_json::to_value(payload) {
            Ok(body) => self
                .dispatcher
                .submit_with_id(&task_id, TaskAction::Bootstrap, body)
                .await
                .map_err(CoordinatorError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = dispatched {
            error!(task_id = %task_id, error = %e, "Bootstrap dispatch failed; releasing lock");
            self.release_lock(&task_id).await?;
            return Err(e);
        }

        let supervisor = self.supervise(task_id.clone(), Duration::from_secs(payload.timeout));
        Ok((task_id, supervisor))
    }

    /// Watch a bootstrap task until it settles or `timeout` passes
    pub fn supervise(&self, task_id: TaskId, timeout: Duration) -> JoinHandle<SupervisionOutcome> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let outcome = coordinator.run_supervisor(&task_id, timeout).await;
            info!(task_id = %task_id, outcome = ?outcome, "Bootstrap supervision finished");
            outcome
        })
    }

    async fn run_supervisor(&self, task_id: &TaskId, timeout: Duration) -> SupervisionOutcome {
        // A timeout past the end of the clock means no deadline.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let state = match self.dispatcher.result(task_id.as_str()).await {
                Ok((state, _)) => state,
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Bootstrap supervision aborted");
                    return SupervisionOutcome::Aborted(e.to_string());
                }
            };

            match state {
                TaskState::Success => return SupervisionOutcome::Succeeded,
                state if state.is_terminal() => {
                    warn!(task_id = %task_id, state = ?state, "Bootstrap task failed");
                    return match self.release_lock(task_id).await {
                        Ok(_) => SupervisionOutcome::Failed(state),
                        Err(e) => {
                            error!(task_id = %task_id, error = %e, "Failed to release bootstrap lock");
                            SupervisionOutcome::Aborted(e.to_string())
                        }
                    };
                }
                _ => {}
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                warn!(task_id = %task_id, timeout_secs = timeout.as_secs(), "Bootstrap timed out");
                if let Err(e) = self.dispatcher.revoke(task_id.as_str()).await {
                    error!(task_id = %task_id, error = %e, "Failed to revoke bootstrap task");
                }
                return match self.release_lock(task_id).await {
                    Ok(_) => SupervisionOutcome::TimedOut,
                    Err(e) => {
                        error!(task_id = %task_id, error = %e, "Failed to release bootstrap lock");
                        SupervisionOutcome::Aborted(e.to_string())
                    }
                };
            }

            let pause = match deadline {
                Some(deadline) => self.poll_interval.min(deadline - now),
                None => self.poll_interval,
            };
            tokio::time::sleep(pause).await;
        }
    }
}
