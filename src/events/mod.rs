//! Event distribution to subscribed clients.
//!
//! Clients subscribe to container changes and to messages. After a sync
//! request has executed, the [`EventBroker`] derives one [`SyncEvent`] per
//! interested subscriber and queues it there. Delivery is at-least-once with
//! per-subscriber ordering:
//!
//! - every event gets the subscriber's next sequence number when queued
//! - sending moves an event from the queue to the sent list
//! - the client reports the highest sequence received (`eventAck`) on its
//!   next request; sent events above it are queued again, in order
//!
//! Queues are drained either by the caller ([`DispatchMode::Synchronous`]) or
//! by a send loop thread per subscriber ([`DispatchMode::Background`]).
//!
//! # Example
//!
//! ```ignore
//! let broker = EventBroker::new(DispatchMode::Synchronous);
//! let (target, events) = ChannelTarget::new(EventEncoding::Json);
//! let target: Arc<dyn EventTarget> = target;
//!
//! broker.subscribe_changes("orders", &[ChangeKind::Create], None, &client, &target)?;
//!
//! // after executing a request of another client
//! broker.enqueue_sync_tasks(&request, None);
//! broker.send_queued_events();
//! let event = decode_event(&events.recv()?, EventEncoding::Json)?;
//! ```

mod broker;
mod subscriber;
mod target;
mod types;

pub use broker::EventBroker;
pub use subscriber::Subscriber;
pub use target::{decode_event, encode_event, ChannelTarget, EventEncoding, EventTarget};
pub use types::{ChangeSubscription, DispatchMode, SubscriberInfo, SyncEvent};
