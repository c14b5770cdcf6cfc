//! Redis broker
//!
//! Messages are JSON documents pushed onto a list named after the queue.
//! Results are read from `celery-task-meta-<id>` keys in the result
//! database, the layout the worker's result backend writes.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rstuf_core::{TaskEnvelope, TaskId, TaskOutcome, TaskQueue, TaskState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

use super::{Broker, BrokerError};

/// Worker task every envelope is addressed to
pub const WORKER_TASK: &str = "app.repository_service_tuf_worker";
pub const REVOKED_SET: &str = "rstuf-revoked";
const RESULT_PREFIX: &str = "celery-task-meta-";

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        BrokerError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    id: &'a str,
    task: &'static str,
    acks_late: bool,
    kwargs: &'a TaskEnvelope,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultRecord {
    status: String,
    #[serde(default)]
    result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    traceback: Option<String>,
    task_id: String,
}

#[derive(Clone)]
pub struct RedisBroker {
    broker: ConnectionManager,
    results: ConnectionManager,
}

impl fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBroker").finish_non_exhaustive()
    }
}

impl RedisBroker {
    /// Connect to the broker database and the result database
    pub async fn connect(broker_url: &str, result_url: &str) -> Result<Self, BrokerError> {
        let broker = ConnectionManager::new(redis::Client::open(broker_url)?).await?;
        let results = ConnectionManager::new(redis::Client::open(result_url)?).await?;
        info!(broker = %broker_url, results = %result_url, "Connected to Redis broker");
        Ok(Self { broker, results })
    }
}

fn outcome_of(record: ResultRecord) -> Result<(TaskState, Option<TaskOutcome>), BrokerError> {
    let state = TaskState::from_broker(&record.status).ok_or_else(|| {
        BrokerError::Serialization(format!("unknown task state {:?}", record.status))
    })?;
    let outcome = match (state, record.result) {
        (_, Value::Null) => None,
        (TaskState::Failure, Value::Object(exc)) => {
            let kind = exc.get("exc_type").and_then(Value::as_str).unwrap_or("Exception");
            let message = match exc.get("exc_message") {
                Some(Value::Array(parts)) => parts
                    .iter()
                    .map(|p| p.as_str().map(String::from).unwrap_or_else(|| p.to_string()))
                    .collect::<Vec<_>>()
                    .join(", "),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            Some(TaskOutcome::Error(format!("{kind}: {message}")))
        }
        (TaskState::Failure, other) => Some(TaskOutcome::Error(other.to_string())),
        (_, value) => Some(TaskOutcome::Value(value)),
    };
    Ok((state, outcome))
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(
        &self,
        queue: TaskQueue,
        task_id: &TaskId,
        envelope: &TaskEnvelope,
    ) -> Result<(), BrokerError> {
        let message = serde_json::to_string(&Message {
            id: task_id.as_str(),
            task: WORKER_TASK,
            acks_late: true,
            kwargs: envelope,
        })?;
        let mut conn = self.broker.clone();
        let _: () = conn.lpush(queue.as_str(), message).await?;
        Ok(())
    }

    async fn result(&self, task_id: &str) -> Result<(TaskState, Option<TaskOutcome>), BrokerError> {
        let mut conn = self.results.clone();
        let raw: Option<String> = conn.get(format!("{RESULT_PREFIX}{task_id}")).await?;
        match raw {
            None => Ok((TaskState::Pending, None)),
            Some(raw) => outcome_of(serde_json::from_str(&raw)?),
        }
    }

    async fn revoke(&self, task_id: &str) -> Result<(), BrokerError> {
        let mut broker = self.broker.clone();
        let _: () = broker.sadd(REVOKED_SET, task_id).await?;

        let record = serde_json::to_string(&ResultRecord {
            status: "REVOKED".into(),
            result: Value::Null,
            traceback: None,
            task_id: task_id.to_string(),
        })?;
        let mut results = self.results.clone();
        if let Err(e) = results
            .set::<_, _, ()>(format!("{RESULT_PREFIX}{task_id}"), record)
            .await
        {
            warn!(task_id = %task_id, error = %e, "Failed to record revocation result");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> ResultRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_success_result_is_a_value() {
        let (state, outcome) = outcome_of(record(json!({
            "status": "SUCCESS",
            "result": {"status": true, "task": "bootstrap"},
            "task_id": "t"
        })))
        .unwrap();
        assert_eq!(state, TaskState::Success);
        assert_eq!(
            outcome,
            Some(TaskOutcome::Value(json!({"status": true, "task": "bootstrap"})))
        );
    }

    #[test]
    fn test_failure_result_is_rendered() {
        let (state, outcome) = outcome_of(record(json!({
            "status": "FAILURE",
            "result": {"exc_type": "KeyError", "exc_message": ["ROOT_SIGNING"]},
            "task_id": "t"
        })))
        .unwrap();
        assert_eq!(state, TaskState::Failure);
        assert_eq!(outcome, Some(TaskOutcome::Error("KeyError: ROOT_SIGNING".into())));
    }

    #[test]
    fn test_errored_is_not_accepted_from_the_backend() {
        let err = outcome_of(record(json!({"status": "ERRORED", "task_id": "t"})));
        assert!(err.is_err());
    }

    #[test]
    fn test_message_layout() {
        let envelope = TaskEnvelope {
            action: rstuf_core::TaskAction::Bootstrap,
            payload: json!({"timeout": 300}),
        };
        let message = serde_json::to_value(Message {
            id: "abc",
            task: WORKER_TASK,
            acks_late: true,
            kwargs: &envelope,
        })
        .unwrap();
        assert_eq!(
            message,
            json!({
                "id": "abc",
                "task": WORKER_TASK,
                "acks_late": true,
                "kwargs": {"action": "bootstrap", "payload": {"timeout": 300}}
            })
        );
    }
}
