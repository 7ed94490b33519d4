//! Sync request, task and result types.

use crate::error::TaskError;
use crate::types::{ChangeKind, ClientId, EventSeq, TaskType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::filter::JsonFilter;

/// Patch of a single entity, identified by its key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    pub id: String,
    /// JSON merge-patch applied to the entity.
    pub patch: Value,
}

/// One unit of work inside a [`SyncRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "camelCase")]
pub enum SyncTask {
    // --- Container mutations ---
    Create {
        container: String,
        entities: Vec<Value>,
    },
    Upsert {
        container: String,
        entities: Vec<Value>,
    },
    Delete {
        container: String,
        ids: Vec<String>,
    },
    Patch {
        container: String,
        patches: Vec<EntityPatch>,
    },

    // --- Container reads ---
    Read {
        container: String,
        ids: Vec<String>,
    },
    Query {
        container: String,
        #[serde(default)]
        filter: Option<JsonFilter>,
        #[serde(default)]
        limit: Option<usize>,
    },
    /// Count entities matching an optional filter.
    Aggregate {
        container: String,
        #[serde(default)]
        filter: Option<JsonFilter>,
    },
    CloseCursors {
        container: String,
        cursors: Vec<String>,
    },

    // --- Messages ---
    Message {
        name: String,
        #[serde(default)]
        param: Value,
    },
    Command {
        name: String,
        #[serde(default)]
        param: Value,
    },

    // --- Subscriptions ---
    SubscribeMessage {
        name: String,
        #[serde(default)]
        remove: bool,
    },
    /// An empty `changes` list removes the subscription of `container`.
    SubscribeChanges {
        container: String,
        changes: Vec<ChangeKind>,
        #[serde(default)]
        filter: Option<JsonFilter>,
    },
}

impl SyncTask {
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Create { .. } => TaskType::Create,
            Self::Upsert { .. } => TaskType::Upsert,
            Self::Delete { .. } => TaskType::Delete,
            Self::Patch { .. } => TaskType::Patch,
            Self::Read { .. } => TaskType::Read,
            Self::Query { .. } => TaskType::Query,
            Self::Aggregate { .. } => TaskType::Aggregate,
            Self::CloseCursors { .. } => TaskType::CloseCursors,
            Self::Message { .. } => TaskType::Message,
            Self::Command { .. } => TaskType::Command,
            Self::SubscribeMessage { .. } => TaskType::SubscribeMessage,
            Self::SubscribeChanges { .. } => TaskType::SubscribeChanges,
        }
    }

    /// Container targeted by the task, if it is a container task.
    pub fn container(&self) -> Option<&str> {
        match self {
            Self::Create { container, .. }
            | Self::Upsert { container, .. }
            | Self::Delete { container, .. }
            | Self::Patch { container, .. }
            | Self::Read { container, .. }
            | Self::Query { container, .. }
            | Self::Aggregate { container, .. }
            | Self::CloseCursors { container, .. }
            | Self::SubscribeChanges { container, .. } => Some(container),
            Self::Message { .. } | Self::Command { .. } | Self::SubscribeMessage { .. } => None,
        }
    }

    /// Change kind of a container mutation, `None` for every other task.
    pub fn change_kind(&self) -> Option<ChangeKind> {
        match self {
            Self::Create { .. } => Some(ChangeKind::Create),
            Self::Upsert { .. } => Some(ChangeKind::Upsert),
            Self::Delete { .. } => Some(ChangeKind::Delete),
            Self::Patch { .. } => Some(ChangeKind::Patch),
            _ => None,
        }
    }

    /// Name of a message or command task.
    pub fn message_name(&self) -> Option<&str> {
        match self {
            Self::Message { name, .. } | Self::Command { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether the task can be part of a [`SyncEvent`](crate::events::SyncEvent).
    pub fn is_event_source(&self) -> bool {
        self.change_kind().is_some() || self.message_name().is_some()
    }

    /// Checks required fields. Returns a description of the first problem.
    pub fn validate(&self) -> std::result::Result<(), TaskError> {
        if let Some(container) = self.container() {
            if container.is_empty() {
                return Err(TaskError::invalid_task(format!(
                    "{}: missing container",
                    self.task_type()
                )));
            }
        }
        match self {
            Self::Message { name, .. }
            | Self::Command { name, .. }
            | Self::SubscribeMessage { name, .. } => {
                if name.is_empty() {
                    return Err(TaskError::invalid_task(format!(
                        "{}: missing name",
                        self.task_type()
                    )));
                }
            }
            Self::Patch { patches, .. } => {
                if patches.iter().any(|p| p.id.is_empty()) {
                    return Err(TaskError::invalid_task("patch: missing entity id"));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Result of a single task, at the same index as the task in the request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "camelCase")]
pub enum TaskResult {
    Create,
    Upsert,
    Delete,
    Patch,
    Read { entities: Vec<Value> },
    Query { entities: Vec<Value> },
    Aggregate { value: f64 },
    CloseCursors { count: usize },
    Message,
    Command { result: Value },
    SubscribeMessage,
    SubscribeChanges,
    Error { error: TaskError },
}

impl TaskResult {
    pub fn error(error: TaskError) -> Self {
        TaskResult::Error { error }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, TaskResult::Error { .. })
    }

    pub fn as_error(&self) -> Option<&TaskError> {
        match self {
            TaskResult::Error { error } => Some(error),
            _ => None,
        }
    }
}

/// A batch of tasks sent by a client.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Required for subscriptions and for acknowledging events.
    #[serde(default)]
    pub client_id: Option<ClientId>,

    /// Highest event sequence the client has received.
    #[serde(default)]
    pub event_ack: Option<EventSeq>,

    pub tasks: Vec<SyncTask>,
}

impl SyncRequest {
    pub fn new(tasks: Vec<SyncTask>) -> Self {
        Self {
            client_id: None,
            event_ack: None,
            tasks,
        }
    }

    pub fn with_client(mut self, client_id: impl Into<ClientId>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_ack(mut self, ack: EventSeq) -> Self {
        self.event_ack = Some(ack);
        self
    }
}

/// Response to a [`SyncRequest`]. `results[i]` belongs to `tasks[i]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(default)]
    pub client_id: Option<ClientId>,
    pub results: Vec<TaskResult>,
}
