//! Event targets and event encoding.

use crate::error::{HubError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::types::SyncEvent;

/// Somewhere events can be sent, typically one client connection.
///
/// The broker keeps only a weak reference. The connection owns the target,
/// and a dropped target is treated as closed.
pub trait EventTarget: Send + Sync {
    /// Whether the connection can currently accept events.
    fn is_open(&self) -> bool;

    /// Deliver one event. May block on network I/O.
    fn send_event(&self, event: &SyncEvent) -> Result<()>;
}

/// Byte encoding of events written to a transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventEncoding {
    #[default]
    Json,
    MessagePack,
}

pub fn encode_event(event: &SyncEvent, encoding: EventEncoding) -> Result<Vec<u8>> {
    match encoding {
        EventEncoding::Json => Ok(serde_json::to_vec(event)?),
        EventEncoding::MessagePack => Ok(rmp_serde::to_vec_named(event)?),
    }
}

pub fn decode_event(bytes: &[u8], encoding: EventEncoding) -> Result<SyncEvent> {
    match encoding {
        EventEncoding::Json => {
            serde_json::from_slice(bytes).map_err(|e| HubError::Deserialization(e.to_string()))
        }
        EventEncoding::MessagePack => Ok(rmp_serde::from_slice(bytes)?),
    }
}

/// In-process target writing encoded events into a channel.
///
/// The receiving half plays the role of the client connection.
pub struct ChannelTarget {
    sender: Sender<Vec<u8>>,
    encoding: EventEncoding,
    open: AtomicBool,
}

impl ChannelTarget {
    /// Create a target and the receiver its events arrive on.
    pub fn new(encoding: EventEncoding) -> (Arc<ChannelTarget>, Receiver<Vec<u8>>) {
        let (sender, receiver) = unbounded();
        (Arc::new(Self::with_sender(sender, encoding)), receiver)
    }

    pub fn with_sender(sender: Sender<Vec<u8>>, encoding: EventEncoding) -> Self {
        Self {
            sender,
            encoding,
            open: AtomicBool::new(true),
        }
    }

    pub fn encoding(&self) -> EventEncoding {
        self.encoding
    }

    /// Mark the connection closed. Queued events stay with the broker.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn reopen(&self) {
        self.open.store(true, Ordering::SeqCst);
    }
}

impl EventTarget for ChannelTarget {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send_event(&self, event: &SyncEvent) -> Result<()> {
        if !self.is_open() {
            return Err(HubError::TargetClosed(event.target_client.clone()));
        }
        let bytes = encode_event(event, self.encoding)?;
        self.sender
            .send(bytes)
            .map_err(|_| HubError::Send("event receiver disconnected".to_string()))
    }
}
