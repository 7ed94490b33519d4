//! Per-client subscription state and event queues.

use crate::error::{HubError, Result};
use crate::tasks::{filter_changes, SyncTask};
use crate::types::{ClientId, EventSeq};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::target::EventTarget;
use super::types::{ChangeSubscription, DispatchMode, SubscriberInfo, SyncEvent, TriggerSignal};

/// What a client subscribed to.
#[derive(Debug, Default)]
struct Subscriptions {
    /// One entry per container.
    changes: HashMap<String, ChangeSubscription>,
    messages: HashSet<String>,
    /// Subscriptions ending with `*`, stored without it.
    prefixes: HashSet<String>,
}

impl Subscriptions {
    fn count(&self) -> usize {
        self.changes.len() + self.messages.len() + self.prefixes.len()
    }

    fn matches_message(&self, name: &str) -> bool {
        self.messages.contains(name) || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Tasks of an executed request this client is entitled to see, in
    /// request order.
    fn filter_tasks(&self, tasks: &[SyncTask]) -> Vec<SyncTask> {
        let mut result = Vec::new();
        for task in tasks {
            if let Some(name) = task.message_name() {
                if self.matches_message(name) {
                    result.push(task.clone());
                }
                continue;
            }
            let Some(container) = task.container() else {
                continue;
            };
            if let Some(subscription) = self.changes.get(container) {
                if let Some(filtered) = filter_changes(task, subscription) {
                    result.push(filtered);
                }
            }
        }
        result
    }
}

/// Events waiting for delivery and events awaiting acknowledgment.
///
/// Guarded by one mutex so an event is always in exactly one of the lists.
#[derive(Debug, Default)]
struct EventQueues {
    queued: VecDeque<Arc<SyncEvent>>,
    sent: Vec<Arc<SyncEvent>>,
    last_seq: EventSeq,
}

/// Broker-side state of one client.
///
/// Only the [`EventBroker`](super::EventBroker) creates subscribers and
/// changes their subscriptions. Callers get shared handles for draining and
/// monitoring.
pub struct Subscriber {
    client_id: ClientId,
    mode: DispatchMode,
    target: RwLock<Weak<dyn EventTarget>>,
    subscriptions: RwLock<Subscriptions>,
    queues: Mutex<EventQueues>,
    /// Serializes drains so concurrent senders cannot reorder events.
    send_lock: Mutex<()>,
    trigger: Option<Sender<TriggerSignal>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    finished: AtomicBool,
}

impl Subscriber {
    /// Create a subscriber. In background mode this spawns its send loop,
    /// which holds the subscriber until [`finish`](Self::finish) is called.
    pub(crate) fn new(
        client_id: ClientId,
        target: &Arc<dyn EventTarget>,
        mode: DispatchMode,
    ) -> Result<Arc<Self>> {
        let (trigger, signals) = match mode {
            DispatchMode::Synchronous => (None, None),
            DispatchMode::Background => {
                let (sender, receiver) = unbounded();
                (Some(sender), Some(receiver))
            }
        };
        let subscriber = Arc::new(Self {
            client_id,
            mode,
            target: RwLock::new(Arc::downgrade(target)),
            subscriptions: RwLock::new(Subscriptions::default()),
            queues: Mutex::new(EventQueues::default()),
            send_lock: Mutex::new(()),
            trigger,
            worker: Mutex::new(None),
            finished: AtomicBool::new(false),
        });

        if let Some(signals) = signals {
            let worker = Arc::clone(&subscriber);
            let handle = std::thread::Builder::new()
                .name(format!("event-sender-{}", subscriber.client_id))
                .spawn(move || run_send_loop(worker, signals))
                .map_err(|e| HubError::InvariantViolation(format!("spawn send loop: {}", e)))?;
            *subscriber.worker.lock() = Some(handle);
        }
        debug!(client = %subscriber.client_id, ?mode, "subscriber created");
        Ok(subscriber)
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Rebind to a new connection of the same client. Queued events are kept.
    pub(crate) fn update_target(&self, target: &Arc<dyn EventTarget>) {
        let new_target = Arc::downgrade(target);
        {
            let mut current = self.target.write();
            if Weak::ptr_eq(&current, &new_target) {
                return;
            }
            *current = new_target;
        }
        debug!(client = %self.client_id, "event target rebound");
        if self.queued_count() > 0 {
            self.trigger_send(TriggerSignal::Event);
        }
    }

    // --- Subscriptions ---

    /// Add a message subscription. A trailing `*` subscribes to a prefix.
    pub(crate) fn add_message_subscription(&self, name: &str) {
        let mut subs = self.subscriptions.write();
        match name.strip_suffix('*') {
            Some(prefix) => subs.prefixes.insert(prefix.to_string()),
            None => subs.messages.insert(name.to_string()),
        };
    }

    /// Returns whether the subscription existed.
    pub(crate) fn remove_message_subscription(&self, name: &str) -> bool {
        let mut subs = self.subscriptions.write();
        match name.strip_suffix('*') {
            Some(prefix) => subs.prefixes.remove(prefix),
            None => subs.messages.remove(name),
        }
    }

    /// Replace the subscription of the container. An empty change set
    /// removes it instead.
    pub(crate) fn set_change_subscription(&self, subscription: ChangeSubscription) {
        let mut subs = self.subscriptions.write();
        if subscription.changes.is_empty() {
            subs.changes.remove(&subscription.container);
        } else {
            subs.changes
                .insert(subscription.container.clone(), subscription);
        }
    }

    /// Returns whether the subscription existed.
    pub(crate) fn remove_change_subscription(&self, container: &str) -> bool {
        self.subscriptions.write().changes.remove(container).is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().count()
    }

    // --- Queueing ---

    /// Enqueue the tasks of an executed request this client subscribed to.
    ///
    /// Returns the sequence of the new event, or `None` if nothing matched.
    /// Calling this on a subscriber without subscriptions is an invariant
    /// violation.
    pub(crate) fn enqueue_sync_tasks(
        &self,
        src_client: Option<&ClientId>,
        tasks: &[SyncTask],
    ) -> Result<Option<EventSeq>> {
        let subs = self.subscriptions.read();
        if subs.count() == 0 {
            error!(client = %self.client_id, "enqueue on subscriber without subscriptions");
            debug_assert!(subs.count() > 0, "enqueue on subscriber without subscriptions");
            return Err(HubError::InvariantViolation(format!(
                "subscriber {} has no subscriptions",
                self.client_id
            )));
        }
        let filtered = subs.filter_tasks(tasks);
        drop(subs);
        if filtered.is_empty() {
            return Ok(None);
        }

        let seq = {
            let mut queues = self.queues.lock();
            let seq = queues.last_seq.next();
            queues.last_seq = seq;
            queues.queued.push_back(Arc::new(SyncEvent {
                seq,
                src_client: src_client.cloned(),
                target_client: self.client_id.clone(),
                tasks: filtered,
            }));
            seq
        };
        trace!(client = %self.client_id, %seq, "event queued");
        self.trigger_send(TriggerSignal::Event);
        Ok(Some(seq))
    }

    /// Retire sent events up to `ack`. Sent events above `ack` were not
    /// received and go back to the front of the queue in sequence order.
    pub(crate) fn acknowledge_events(&self, ack: EventSeq) {
        let (acked, requeued) = {
            let mut queues = self.queues.lock();
            let sent = std::mem::take(&mut queues.sent);
            let (acked, mut unacked): (Vec<_>, Vec<_>) =
                sent.into_iter().partition(|event| event.seq <= ack);
            unacked.sort_by_key(|event| event.seq);
            let requeued = unacked.len();
            for event in unacked.into_iter().rev() {
                queues.queued.push_front(event);
            }
            (acked.len(), requeued)
        };
        debug!(client = %self.client_id, %ack, acked, requeued, "events acknowledged");
        if requeued > 0 {
            self.trigger_send(TriggerSignal::Event);
        }
    }

    /// Send every queued event to the bound target.
    ///
    /// Skipped entirely if the target is closed or gone; the events stay
    /// queued. A failed send is logged and the event stays in the sent list
    /// until the next acknowledgment requeues it. Returns the number of
    /// events handed to the target.
    pub fn send_queued_events(&self) -> usize {
        let _sending = self.send_lock.lock();
        let target = self.target.read().upgrade();
        let Some(target) = target.filter(|t| t.is_open()) else {
            trace!(client = %self.client_id, "event target closed, delivery skipped");
            return 0;
        };

        let mut count = 0;
        loop {
            let event = {
                let mut queues = self.queues.lock();
                let Some(event) = queues.queued.pop_front() else {
                    break;
                };
                queues.sent.push(Arc::clone(&event));
                event
            };
            // no queue lock held while sending
            match target.send_event(&event) {
                Ok(()) => trace!(client = %self.client_id, seq = %event.seq, "event sent"),
                Err(e) => warn!(client = %self.client_id, seq = %event.seq, error = %e, "event send failed"),
            }
            count += 1;
        }
        count
    }

    fn trigger_send(&self, signal: TriggerSignal) {
        let Some(trigger) = &self.trigger else {
            return;
        };
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        if trigger.send(signal).is_err() {
            // the loop only exits after `finish`, which sets the flag first
            if self.finished.load(Ordering::SeqCst) {
                return;
            }
            error!(client = %self.client_id, ?signal, "send loop trigger rejected");
            debug_assert!(false, "send loop trigger rejected");
        }
    }

    /// Stop the send loop after one final drain. Returns the loop's handle
    /// on the first call in background mode.
    pub(crate) fn finish(&self) -> Option<JoinHandle<()>> {
        let handle = self.worker.lock().take()?;
        // set first, so no trigger races the loop's exit
        self.finished.store(true, Ordering::SeqCst);
        if let Some(trigger) = &self.trigger {
            if trigger.send(TriggerSignal::Finish).is_err() {
                warn!(client = %self.client_id, "send loop already gone");
            }
        }
        Some(handle)
    }

    // --- Monitoring ---

    pub fn queued_count(&self) -> usize {
        self.queues.lock().queued.len()
    }

    pub fn sent_count(&self) -> usize {
        self.queues.lock().sent.len()
    }

    pub fn info(&self) -> SubscriberInfo {
        let (queued_events, sent_events, last_seq) = {
            let queues = self.queues.lock();
            (queues.queued.len(), queues.sent.len(), queues.last_seq)
        };
        let subs = self.subscriptions.read();
        let mut changes: Vec<ChangeSubscription> = subs.changes.values().cloned().collect();
        changes.sort_by(|a, b| a.container.cmp(&b.container));
        let mut messages: Vec<String> = subs
            .messages
            .iter()
            .cloned()
            .chain(subs.prefixes.iter().map(|p| format!("{}*", p)))
            .collect();
        messages.sort();
        SubscriberInfo {
            client_id: self.client_id.clone(),
            queued_events,
            sent_events,
            last_seq,
            changes,
            messages,
        }
    }
}

fn run_send_loop(subscriber: Arc<Subscriber>, signals: Receiver<TriggerSignal>) {
    while let Ok(signal) = signals.recv() {
        subscriber.send_queued_events();
        if signal == TriggerSignal::Finish {
            break;
        }
    }
    debug!(client = %subscriber.client_id, "send loop finished");
}
