//! In-memory broker
//!
//! Records every submission and serves results that tests script with
//! [`MemoryBroker::set_result`]. Nothing consumes the queues.

use async_trait::async_trait;
use rstuf_core::{TaskEnvelope, TaskId, TaskOutcome, TaskQueue, TaskState};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{Broker, BrokerError};

/// A recorded `publish` call
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub queue: TaskQueue,
    pub task_id: TaskId,
    pub envelope: TaskEnvelope,
}

#[derive(Debug, Default)]
struct State {
    submissions: Vec<Submission>,
    results: HashMap<String, (TaskState, Option<TaskOutcome>)>,
    revoked: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::Unavailable("broker lock poisoned".into()))
    }

    /// Everything published so far, oldest first
    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().map(|s| s.submissions.clone()).unwrap_or_default()
    }

    /// Script the result reported for `task_id`
    pub fn set_result(&self, task_id: &str, state: TaskState, outcome: Option<TaskOutcome>) {
        if let Ok(mut s) = self.lock() {
            s.results.insert(task_id.to_string(), (state, outcome));
        }
    }

    pub fn is_revoked(&self, task_id: &str) -> bool {
        self.lock().map(|s| s.revoked.contains(task_id)).unwrap_or(false)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(
        &self,
        queue: TaskQueue,
        task_id: &TaskId,
        envelope: &TaskEnvelope,
    ) -> Result<(), BrokerError> {
        self.lock()?.submissions.push(Submission {
            queue,
            task_id: task_id.clone(),
            envelope: envelope.clone(),
        });
        Ok(())
    }

    async fn result(&self, task_id: &str) -> Result<(TaskState, Option<TaskOutcome>), BrokerError> {
        Ok(self
            .lock()?
            .results
            .get(task_id)
            .cloned()
            .unwrap_or((TaskState::Pending, None)))
    }

    async fn revoke(&self, task_id: &str) -> Result<(), BrokerError> {
        let mut s = self.lock()?;
        s.revoked.insert(task_id.to_string());
        s.results
            .insert(task_id.to_string(), (TaskState::Revoked, None));
        Ok(())
    }
}
