//! # Sync Hub
//!
//! Event distribution and authorization core of a container-oriented
//! data-sync hub. Clients send batches of tasks against named entity
//! containers; the hub authorizes and executes them and pushes the resulting
//! changes and messages to other clients that subscribed to them.
//!
//! ## Core Concepts
//!
//! - **Tasks**: create/upsert/delete/patch/read/query/message/subscribe units
//!   of work, batched in a [`SyncRequest`]
//! - **Authorizers**: composable, stateless predicates over tasks
//! - **Subscribers**: per-client subscriptions plus a sequenced event queue
//! - **Broker**: fans executed requests out to subscribers, at-least-once and
//!   in order per subscriber, retiring events on client acknowledgment
//! - **Remote requests**: correlate responses to requests on multiplexed
//!   connections
//!
//! ## Example
//!
//! ```ignore
//! use synchub::{HubConfig, SyncHub, SyncRequest, SyncTask, ChangeKind};
//!
//! let hub = SyncHub::new(HubConfig::default(), executor);
//! let (target, events) = hub.create_channel_target();
//! let target: Arc<dyn EventTarget> = target;
//!
//! // client "a" subscribes to new orders
//! hub.execute_sync(
//!     SyncRequest::new(vec![SyncTask::SubscribeChanges {
//!         container: "orders".into(),
//!         changes: vec![ChangeKind::Create],
//!         filter: None,
//!     }])
//!     .with_client("a"),
//!     Some(&target),
//! );
//!
//! // client "b" creates an order, "a" gets an event
//! hub.execute_sync(create_order.with_client("b"), None);
//! hub.broker().send_queued_events();
//! ```

pub mod auth;
pub mod error;
pub mod events;
pub mod hub;
pub mod remote;
pub mod tasks;
pub mod types;

// Re-exports
pub use auth::{Authorizer, Right};
pub use error::{HubError, Result, TaskError, TaskErrorKind};
pub use events::{
    decode_event, encode_event, ChangeSubscription, ChannelTarget, DispatchMode, EventBroker,
    EventEncoding, EventTarget, Subscriber, SubscriberInfo, SyncEvent,
};
pub use hub::{HubConfig, SyncHub, TaskExecutor};
pub use remote::{RemoteRequest, RemoteRequestMap, ResponseReceiver};
pub use tasks::{
    filter_changes, CompiledFilter, EntityPatch, JsonFilter, SyncRequest, SyncResponse, SyncTask,
    TaskResult,
};
pub use types::*;
