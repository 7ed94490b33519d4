//! Core identifier and value types for the hub.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a connected client.
///
/// Used as the key of the subscriber registry. A client keeps its id across
/// reconnects so queued events survive a transport change.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        ClientId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        ClientId(id.to_string())
    }
}

/// Per-subscriber event sequence number.
///
/// Assigned when an event is enqueued. Sequence 0 is never assigned, so an
/// ack of 0 acknowledges nothing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct EventSeq(pub u64);

impl EventSeq {
    pub fn next(self) -> Self {
        EventSeq(self.0 + 1)
    }
}

impl fmt::Debug for EventSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for EventSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of container mutation a client can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Create,
    Upsert,
    Delete,
    Patch,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 4] = [
        ChangeKind::Create,
        ChangeKind::Upsert,
        ChangeKind::Delete,
        ChangeKind::Patch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::Patch => "patch",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of a [`SyncTask`](crate::tasks::SyncTask).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskType {
    Create,
    Upsert,
    Delete,
    Patch,
    Read,
    Query,
    Aggregate,
    CloseCursors,
    Message,
    Command,
    SubscribeMessage,
    SubscribeChanges,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::Patch => "patch",
            Self::Read => "read",
            Self::Query => "query",
            Self::Aggregate => "aggregate",
            Self::CloseCursors => "closeCursors",
            Self::Message => "message",
            Self::Command => "command",
            Self::SubscribeMessage => "subscribeMessage",
            Self::SubscribeChanges => "subscribeChanges",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container operation granted by a container authorizer.
///
/// `Mutate` and `Full` are shorthands expanded when the authorizer is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    Create,
    Upsert,
    Delete,
    Patch,
    Read,
    Query,
    /// create, upsert, delete and patch
    Mutate,
    /// every operation
    Full,
}
