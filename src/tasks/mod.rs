//! Sync tasks, task results and change filtering.
//!
//! A client sends a [`SyncRequest`] holding an ordered list of [`SyncTask`]s.
//! The hub answers with a [`SyncResponse`] carrying one [`TaskResult`] per
//! task. Executed mutations are re-derived per subscriber by
//! [`filter_changes`] before they are fanned out as events.

mod changes;
mod filter;
mod types;

pub use changes::filter_changes;
pub use filter::{CompiledFilter, JsonFilter};
pub use types::{EntityPatch, SyncRequest, SyncResponse, SyncTask, TaskResult};
