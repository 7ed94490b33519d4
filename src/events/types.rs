//! Event and subscription types.

use crate::tasks::{JsonFilter, SyncTask};
use crate::types::{ChangeKind, ClientId, EventSeq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A sequenced bundle of filtered tasks destined for one subscriber.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    /// Per-subscriber sequence, assigned when the event is enqueued.
    pub seq: EventSeq,
    /// Client that sent the request the tasks originate from.
    #[serde(default)]
    pub src_client: Option<ClientId>,
    /// Subscriber the event is delivered to.
    pub target_client: ClientId,
    pub tasks: Vec<SyncTask>,
}

/// Subscription to the mutations of one container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeSubscription {
    pub container: String,
    pub changes: BTreeSet<ChangeKind>,
    #[serde(default)]
    pub filter: Option<JsonFilter>,
}

impl ChangeSubscription {
    pub fn new(
        container: impl Into<String>,
        changes: impl IntoIterator<Item = ChangeKind>,
        filter: Option<JsonFilter>,
    ) -> Self {
        Self {
            container: container.into(),
            changes: changes.into_iter().collect(),
            filter,
        }
    }
}

/// How queued events reach their targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchMode {
    /// Queues are drained explicitly by the caller.
    #[default]
    Synchronous,
    /// Every subscriber runs its own send loop thread.
    Background,
}

/// Signal consumed by a background send loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TriggerSignal {
    /// Send everything currently queued.
    Event,
    /// Send once more, then stop.
    Finish,
}

/// Read-only snapshot of a subscriber, for monitoring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberInfo {
    pub client_id: ClientId,
    pub queued_events: usize,
    pub sent_events: usize,
    /// Sequence of the most recently enqueued event.
    pub last_seq: EventSeq,
    /// Sorted by container.
    pub changes: Vec<ChangeSubscription>,
    /// Exact names and `prefix*` entries, sorted.
    pub messages: Vec<String>,
}
