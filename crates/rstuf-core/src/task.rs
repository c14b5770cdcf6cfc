//! Task model
//!
//! A task is a single `{action, payload}` envelope handed to the worker. The
//! API only learns what happened to it by asking the broker's result backend,
//! whose answers are normalized here into the view returned by `GET /task`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 128-bit random task identifier, rendered as 32 lower-case hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Broker queues the worker listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskQueue {
    /// Every operation that mutates repository metadata
    MetadataRepository,
    /// Publish-only fan-out
    RstufInternals,
}

impl TaskQueue {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskQueue::MetadataRepository => "metadata_repository",
            TaskQueue::RstufInternals => "rstuf_internals",
        }
    }
}

impl fmt::Display for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions understood by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Bootstrap,
    AddArtifacts,
    RemoveArtifacts,
    PublishArtifacts,
    MetadataUpdate,
    ForceOnlineMetadataUpdate,
    SignMetadata,
    DeleteSignMetadata,
    MetadataDelegation,
    UpdateSettings,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Bootstrap => "bootstrap",
            TaskAction::AddArtifacts => "add_artifacts",
            TaskAction::RemoveArtifacts => "remove_artifacts",
            TaskAction::PublishArtifacts => "publish_artifacts",
            TaskAction::MetadataUpdate => "metadata_update",
            TaskAction::ForceOnlineMetadataUpdate => "force_online_metadata_update",
            TaskAction::SignMetadata => "sign_metadata",
            TaskAction::DeleteSignMetadata => "delete_sign_metadata",
            TaskAction::MetadataDelegation => "metadata_delegation",
            TaskAction::UpdateSettings => "update_settings",
        }
    }

    /// Queue this action is routed to
    pub fn queue(&self) -> TaskQueue {
        match self {
            TaskAction::PublishArtifacts => TaskQueue::RstufInternals,
            _ => TaskQueue::MetadataRepository,
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of every broker message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub action: TaskAction,
    pub payload: Value,
}

/// Task states as reported by `GET /task`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Received,
    Started,
    Running,
    Success,
    Failure,
    Revoked,
    Retry,
    Rejected,
    Ignored,
    /// Never reported by the broker; see [`TaskView::normalize`]
    Errored,
}

impl TaskState {
    /// Parse a state string reported by the broker's result backend
    ///
    /// `ERRORED` is synthesized locally and is not accepted from the broker.
    pub fn from_broker(state: &str) -> Option<Self> {
        match state {
            "PENDING" => Some(TaskState::Pending),
            "RECEIVED" => Some(TaskState::Received),
            "STARTED" => Some(TaskState::Started),
            "RUNNING" => Some(TaskState::Running),
            "SUCCESS" => Some(TaskState::Success),
            "FAILURE" => Some(TaskState::Failure),
            "REVOKED" => Some(TaskState::Revoked),
            "RETRY" => Some(TaskState::Retry),
            "REJECTED" => Some(TaskState::Rejected),
            "IGNORED" => Some(TaskState::Ignored),
            _ => None,
        }
    }

    /// No further state changes will be reported
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Success
                | TaskState::Failure
                | TaskState::Revoked
                | TaskState::Rejected
                | TaskState::Ignored
                | TaskState::Errored
        )
    }
}

/// What the result backend holds for a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The value the worker returned
    Value(Value),
    /// The task raised; carries the rendered exception
    Error(String),
}

/// Normalized task result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskResultView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl TaskResultView {
    fn from_object(object: &Map<String, Value>) -> Self {
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(String::from);
        Self {
            message: text("message"),
            error: text("error"),
            status: object.get("status").and_then(Value::as_bool),
            task: text("task"),
            last_update: text("last_update"),
            details: object.get("details").filter(|d| !d.is_null()).cloned(),
        }
    }

    fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// `GET /task` view of a task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub task_id: String,
    pub state: TaskState,
    pub result: Option<TaskResultView>,
}

impl TaskView {
    /// Build the view from what the broker reported
    ///
    /// Exceptions become `{message}`. A `SUCCESS` whose result does not carry
    /// `status: true` is reported as `ERRORED`.
    pub fn normalize(task_id: impl Into<String>, state: TaskState, outcome: Option<TaskOutcome>) -> Self {
        let result = match outcome {
            None | Some(TaskOutcome::Value(Value::Null)) => None,
            Some(TaskOutcome::Error(message)) => Some(TaskResultView::from_message(message)),
            Some(TaskOutcome::Value(Value::Object(object))) => Some(TaskResultView::from_object(&object)),
            Some(TaskOutcome::Value(Value::String(message))) => Some(TaskResultView::from_message(message)),
            Some(TaskOutcome::Value(other)) => Some(TaskResultView::from_message(other.to_string())),
        };

        let succeeded = result.as_ref().and_then(|r| r.status).unwrap_or(false);
        let state = if state == TaskState::Success && !succeeded {
            TaskState::Errored
        } else {
            state
        };

        Self {
            task_id: task_id.into(),
            state,
            result,
        }
    }
}
