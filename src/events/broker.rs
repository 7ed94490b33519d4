//! Subscriber registry and fan-out of executed requests.

use crate::error::Result;
use crate::tasks::{JsonFilter, SyncRequest};
use crate::types::{ChangeKind, ClientId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::subscriber::Subscriber;
use super::target::EventTarget;
use super::types::{ChangeSubscription, DispatchMode, SubscriberInfo};

/// Registry of subscribers keyed by client id.
///
/// A subscriber exists while it has at least one subscription. It is created
/// on its first subscription and removed when its last one is removed.
pub struct EventBroker {
    subscribers: DashMap<ClientId, Arc<Subscriber>>,
    mode: DispatchMode,
}

impl EventBroker {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            subscribers: DashMap::new(),
            mode,
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    // --- Subscriptions ---

    /// Subscribe `client_id` to a message name, or to a prefix if `name`
    /// ends with `*`. With `remove` the subscription is removed instead; this
    /// is a no-op for unknown clients.
    pub fn subscribe_message(
        &self,
        name: &str,
        client_id: &ClientId,
        target: &Arc<dyn EventTarget>,
        remove: bool,
    ) -> Result<()> {
        if remove {
            self.unsubscribe(client_id, |subscriber| {
                subscriber.remove_message_subscription(name);
            });
            debug!(client = %client_id, name, "message unsubscribed");
            return Ok(());
        }
        let subscriber = self
            .subscribers
            .entry(client_id.clone())
            .or_try_insert_with(|| Subscriber::new(client_id.clone(), target, self.mode))?;
        subscriber.update_target(target);
        // added while the entry is held, so the subscriber cannot be removed
        subscriber.add_message_subscription(name);
        debug!(client = %client_id, name, "message subscribed");
        Ok(())
    }

    /// Replace the change subscription of `container`. An empty `changes`
    /// set removes it.
    pub fn subscribe_changes(
        &self,
        container: &str,
        changes: &[ChangeKind],
        filter: Option<JsonFilter>,
        client_id: &ClientId,
        target: &Arc<dyn EventTarget>,
    ) -> Result<()> {
        if changes.is_empty() {
            self.unsubscribe(client_id, |subscriber| {
                subscriber.remove_change_subscription(container);
            });
            debug!(client = %client_id, container, "changes unsubscribed");
            return Ok(());
        }
        let subscriber = self
            .subscribers
            .entry(client_id.clone())
            .or_try_insert_with(|| Subscriber::new(client_id.clone(), target, self.mode))?;
        subscriber.update_target(target);
        subscriber.set_change_subscription(ChangeSubscription::new(
            container,
            changes.iter().copied(),
            filter,
        ));
        debug!(client = %client_id, container, ?changes, "changes subscribed");
        Ok(())
    }

    /// Apply `remove` to an existing subscriber and drop the subscriber if
    /// it has no subscriptions left. Both happen while the registry entry is
    /// locked, so fan-out never observes an empty subscriber.
    fn unsubscribe<F>(&self, client_id: &ClientId, remove: F)
    where
        F: FnOnce(&Subscriber),
    {
        let Entry::Occupied(entry) = self.subscribers.entry(client_id.clone()) else {
            return;
        };
        remove(entry.get().as_ref());
        if entry.get().subscription_count() > 0 {
            return;
        }
        let subscriber = entry.remove();
        // the send loop drains once more and exits on its own
        let _detached = subscriber.finish();
        debug!(client = %client_id, "subscriber removed");
    }

    // --- Fan-out ---

    /// Fan out the executed tasks of `request` to every other subscriber.
    ///
    /// First the sender's own subscriber, if any, is rebound to `target` and
    /// its `event_ack` is applied. Then every other subscriber gets one event
    /// with the tasks it subscribed to, if there are any. The sender never
    /// receives its own changes. Returns the number of events enqueued.
    pub fn enqueue_sync_tasks(
        &self,
        request: &SyncRequest,
        target: Option<&Arc<dyn EventTarget>>,
    ) -> usize {
        let sender = request.client_id.as_ref();
        if let Some(client_id) = sender {
            if let Some(subscriber) = self.subscribers.get(client_id) {
                if let Some(target) = target {
                    subscriber.update_target(target);
                }
                if let Some(ack) = request.event_ack {
                    subscriber.acknowledge_events(ack);
                }
            }
        }

        if !request.tasks.iter().any(|task| task.is_event_source()) {
            return 0;
        }

        let mut enqueued = 0;
        for entry in self.subscribers.iter() {
            if Some(entry.key()) == sender {
                continue;
            }
            match entry.value().enqueue_sync_tasks(sender, &request.tasks) {
                Ok(Some(_)) => enqueued += 1,
                Ok(None) => {}
                Err(e) => error!(client = %entry.key(), error = %e, "fan-out failed"),
            }
        }
        enqueued
    }

    /// Drain every subscriber queue. Used in synchronous mode.
    pub fn send_queued_events(&self) -> usize {
        // no registry lock held while sending
        let subscribers: Vec<Arc<Subscriber>> = self
            .subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        subscribers
            .iter()
            .map(|subscriber| subscriber.send_queued_events())
            .sum()
    }

    /// Stop every background send loop after a final drain and wait for all
    /// of them. The loops finish concurrently.
    pub fn finish_queues(&self) {
        let handles: Vec<_> = self
            .subscribers
            .iter()
            .filter_map(|entry| entry.value().finish().map(|h| (entry.key().clone(), h)))
            .collect();
        for (client_id, handle) in handles {
            if handle.join().is_err() {
                warn!(client = %client_id, "send loop panicked");
            }
        }
    }

    // --- Access & monitoring ---

    /// Shared handle to one subscriber for draining and monitoring. Its
    /// subscriptions can only be changed through the broker.
    pub fn subscriber(&self, client_id: &ClientId) -> Option<Arc<Subscriber>> {
        self.subscribers
            .get(client_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.subscribers.contains_key(client_id)
    }

    pub fn subscriber_info(&self, client_id: &ClientId) -> Option<SubscriberInfo> {
        self.subscribers.get(client_id).map(|entry| entry.info())
    }

    /// Snapshots of all subscribers, sorted by client id.
    pub fn subscriber_infos(&self) -> Vec<SubscriberInfo> {
        let mut infos: Vec<SubscriberInfo> =
            self.subscribers.iter().map(|entry| entry.info()).collect();
        infos.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        infos
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new(DispatchMode::default())
    }
}

impl Drop for EventBroker {
    fn drop(&mut self) {
        // send loops hold their subscriber and would otherwise never exit
        self.finish_queues();
    }
}
