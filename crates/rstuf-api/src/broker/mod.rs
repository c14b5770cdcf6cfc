//! Task dispatch
//!
//! The API never performs repository work itself. Each accepted request
//! becomes one `{action, payload}` envelope on a broker queue, acknowledged
//! late so a worker crash re-delivers it. Results are read back from the
//! broker's result backend when a client polls `GET /task` and by the
//! bootstrap supervisor.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::{MemoryBroker, Submission};
#[cfg(feature = "redis")]
pub use self::redis::RedisBroker;

use async_trait::async_trait;
use rstuf_core::{TaskAction, TaskEnvelope, TaskId, TaskOutcome, TaskQueue, TaskState};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Broker serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::Serialization(err.to_string())
    }
}

/// Message broker and result backend
#[async_trait]
pub trait Broker: Send + Sync + Debug {
    /// Enqueue an envelope with late acknowledgement
    async fn publish(
        &self,
        queue: TaskQueue,
        task_id: &TaskId,
        envelope: &TaskEnvelope,
    ) -> Result<(), BrokerError>;

    /// Current state and result of a task; unknown ids are `PENDING`
    async fn result(&self, task_id: &str) -> Result<(TaskState, Option<TaskOutcome>), BrokerError>;

    /// Ask workers not to run (or to stop) a task
    async fn revoke(&self, task_id: &str) -> Result<(), BrokerError>;
}

/// Submits typed jobs and reads their results
#[derive(Debug, Clone)]
pub struct TaskDispatcher {
    broker: Arc<dyn Broker>,
}

impl TaskDispatcher {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Submit under a freshly generated id, routed to the action's queue
    pub async fn submit(&self, action: TaskAction, payload: Value) -> Result<TaskId, BrokerError> {
        let task_id = TaskId::generate();
        self.submit_with_id(&task_id, action, payload).await?;
        Ok(task_id)
    }

    /// Submit under an id the caller already generated
    pub async fn submit_with_id(
        &self,
        task_id: &TaskId,
        action: TaskAction,
        payload: Value,
    ) -> Result<(), BrokerError> {
        self.submit_to(action.queue(), task_id, action, payload).await
    }

    pub async fn submit_to(
        &self,
        queue: TaskQueue,
        task_id: &TaskId,
        action: TaskAction,
        payload: Value,
    ) -> Result<(), BrokerError> {
        let envelope = TaskEnvelope { action, payload };
        self.broker.publish(queue, task_id, &envelope).await?;
        info!(task_id = %task_id, action = %action, queue = %queue, "Submitted task");
        Ok(())
    }

    pub async fn result(&self, task_id: &str) -> Result<(TaskState, Option<TaskOutcome>), BrokerError> {
        self.broker.result(task_id).await
    }

    pub async fn revoke(&self, task_id: &str) -> Result<(), BrokerError> {
        self.broker.revoke(task_id).await?;
        info!(task_id = %task_id, "Revoked task");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_submit_routes_by_action() {
        let broker = Arc::new(MemoryBroker::new());
        let dispatcher = TaskDispatcher::new(broker.clone());

        let add = dispatcher
            .submit(TaskAction::AddArtifacts, json!({"artifacts": []}))
            .await
            .unwrap();
        let publish = dispatcher
            .submit(TaskAction::PublishArtifacts, Value::Null)
            .await
            .unwrap();
        assert_ne!(add, publish);

        let submissions = broker.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].queue, TaskQueue::MetadataRepository);
        assert_eq!(submissions[0].task_id, add);
        assert_eq!(submissions[0].envelope.action, TaskAction::AddArtifacts);
        assert_eq!(submissions[1].queue, TaskQueue::RstufInternals);
    }

    #[tokio::test]
    async fn test_submit_with_id_keeps_id() {
        let broker = Arc::new(MemoryBroker::new());
        let dispatcher = TaskDispatcher::new(broker.clone());
        let id = TaskId::generate();

        dispatcher
            .submit_with_id(&id, TaskAction::Bootstrap, json!({}))
            .await
            .unwrap();
        assert_eq!(broker.submissions()[0].task_id, id);
    }

    #[tokio::test]
    async fn test_unknown_task_is_pending() {
        let dispatcher = TaskDispatcher::new(Arc::new(MemoryBroker::new()));
        let (state, outcome) = dispatcher.result("nope").await.unwrap();
        assert_eq!(state, TaskState::Pending);
        assert!(outcome.is_none());
    }
}
