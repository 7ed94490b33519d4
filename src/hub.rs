//! Sync hub tying authorization, execution and event fan-out together.

use crate::auth::{Authorizer, Right};
use crate::error::{HubError, Result, TaskError, TaskErrorKind};
use crate::events::{ChannelTarget, DispatchMode, EventBroker, EventEncoding, EventTarget};
use crate::tasks::{SyncRequest, SyncResponse, SyncTask, TaskResult};
use crate::types::ClientId;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Hub configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HubConfig {
    /// How subscriber queues are drained.
    pub dispatch: DispatchMode,

    /// Access rights applied to every task. Default: allow all.
    pub rights: Right,

    /// Encoding of targets created by [`SyncHub::create_channel_target`].
    pub encoding: EventEncoding,
}

impl HubConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| HubError::InvalidConfig(e.to_string()))
    }
}

/// Executes container and message tasks, e.g. against a database.
///
/// Subscription tasks never reach the executor.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: &SyncTask) -> std::result::Result<TaskResult, TaskError>;
}

/// Entry point for sync requests.
pub struct SyncHub {
    config: HubConfig,
    authorizer: Authorizer,
    broker: EventBroker,
    executor: Arc<dyn TaskExecutor>,
}

impl SyncHub {
    pub fn new(config: HubConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        let authorizer = config.rights.to_authorizer();
        let broker = EventBroker::new(config.dispatch);
        Self {
            config,
            authorizer,
            broker,
            executor,
        }
    }

    /// Replace the authorizer built from the configured rights.
    pub fn with_authorizer(mut self, authorizer: Authorizer) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn broker(&self) -> &EventBroker {
        &self.broker
    }

    /// In-process target using the configured encoding.
    pub fn create_channel_target(&self) -> (Arc<ChannelTarget>, Receiver<Vec<u8>>) {
        ChannelTarget::new(self.config.encoding)
    }

    /// Execute all tasks of `request` and fan out what succeeded.
    ///
    /// `target` is the event target of the requesting connection. It is
    /// required for subscription tasks and rebinds an existing subscriber of
    /// the same client. Task failures are reported per task in the response.
    pub fn execute_sync(
        &self,
        request: SyncRequest,
        target: Option<&Arc<dyn EventTarget>>,
    ) -> SyncResponse {
        let SyncRequest {
            client_id,
            event_ack,
            tasks,
        } = request;

        let mut results = Vec::with_capacity(tasks.len());
        let mut executed = Vec::new();
        for task in tasks {
            let result = self.execute_task(&task, client_id.as_ref(), target);
            if !result.is_error() && task.is_event_source() {
                executed.push(task);
            }
            results.push(result);
        }

        let fan_out = SyncRequest {
            client_id: client_id.clone(),
            event_ack,
            tasks: executed,
        };
        let events = self.broker.enqueue_sync_tasks(&fan_out, target);
        debug!(
            client = ?client_id,
            tasks = results.len(),
            events,
            "sync request executed"
        );
        SyncResponse { client_id, results }
    }

    fn execute_task(
        &self,
        task: &SyncTask,
        client_id: Option<&ClientId>,
        target: Option<&Arc<dyn EventTarget>>,
    ) -> TaskResult {
        if !self.authorizer.authorize(task) {
            return TaskResult::error(TaskError::permission_denied(describe(task)));
        }
        if let Err(error) = task.validate() {
            return TaskResult::error(error);
        }
        match task {
            SyncTask::SubscribeMessage { name, remove } => {
                let (Some(client_id), Some(target)) = (client_id, target) else {
                    return TaskResult::error(TaskError::invalid_task(
                        "subscribeMessage requires a client id and an event target",
                    ));
                };
                match self
                    .broker
                    .subscribe_message(name, client_id, target, *remove)
                {
                    Ok(()) => TaskResult::SubscribeMessage,
                    Err(e) => internal_error(e),
                }
            }
            SyncTask::SubscribeChanges {
                container,
                changes,
                filter,
            } => {
                let (Some(client_id), Some(target)) = (client_id, target) else {
                    return TaskResult::error(TaskError::invalid_task(
                        "subscribeChanges requires a client id and an event target",
                    ));
                };
                match self.broker.subscribe_changes(
                    container,
                    changes,
                    filter.clone(),
                    client_id,
                    target,
                ) {
                    Ok(()) => TaskResult::SubscribeChanges,
                    Err(e) => internal_error(e),
                }
            }
            _ => self
                .executor
                .execute(task)
                .unwrap_or_else(TaskResult::error),
        }
    }

    /// Drain every queue once more and stop background send loops.
    pub fn finish(&self) {
        self.broker.finish_queues();
    }
}

fn describe(task: &SyncTask) -> String {
    match (task.container(), task.message_name()) {
        (Some(container), _) => format!("{} on {} not authorized", task.task_type(), container),
        (_, Some(name)) => format!("{} {} not authorized", task.task_type(), name),
        _ => format!("{} not authorized", task.task_type()),
    }
}

fn internal_error(error: HubError) -> TaskResult {
    TaskResult::error(TaskError::new(TaskErrorKind::InternalError, error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeKind, OperationType};
    use serde_json::json;

    struct AcceptAll;

    impl TaskExecutor for AcceptAll {
        fn execute(&self, task: &SyncTask) -> std::result::Result<TaskResult, TaskError> {
            Ok(match task {
                SyncTask::Create { .. } => TaskResult::Create,
                SyncTask::Upsert { .. } => TaskResult::Upsert,
                SyncTask::Delete { .. } => TaskResult::Delete,
                SyncTask::Patch { .. } => TaskResult::Patch,
                SyncTask::Message { .. } => TaskResult::Message,
                _ => {
                    return Err(TaskError::new(
                        TaskErrorKind::NotImplemented,
                        task.task_type().to_string(),
                    ))
                }
            })
        }
    }

    fn hub(config: HubConfig) -> SyncHub {
        SyncHub::new(config, Arc::new(AcceptAll))
    }

    #[test]
    fn test_config_from_json() {
        let config = HubConfig::from_json(
            r#"{
                "dispatch": "background",
                "encoding": "messagePack",
                "rights": { "type": "container", "name": "orders", "operations": ["full"] }
            }"#,
        )
        .unwrap();
        assert_eq!(config.dispatch, DispatchMode::Background);
        assert_eq!(config.encoding, EventEncoding::MessagePack);

        let defaults = HubConfig::from_json("{}").unwrap();
        assert_eq!(defaults, HubConfig::default());

        let invalid = HubConfig::from_json(r#"{"dispatch": "sometimes"}"#);
        assert!(matches!(invalid, Err(HubError::InvalidConfig(_))));
    }

    #[test]
    fn test_denied_task_does_not_affect_siblings() {
        let config = HubConfig {
            rights: Right::Container {
                name: "orders".to_string(),
                operations: vec![OperationType::Create],
                subscribe_changes: vec![],
            },
            ..Default::default()
        };
        let hub = hub(config);
        let request = SyncRequest::new(vec![
            SyncTask::Delete {
                container: "orders".to_string(),
                ids: vec!["1".to_string()],
            },
            SyncTask::Create {
                container: "orders".to_string(),
                entities: vec![json!({"id": "1"})],
            },
        ]);
        let response = hub.execute_sync(request, None);
        let error = response.results[0].as_error().unwrap();
        assert_eq!(error.kind, TaskErrorKind::PermissionDenied);
        assert_eq!(error.message, "delete on orders not authorized");
        assert_eq!(response.results[1], TaskResult::Create);
    }

    #[test]
    fn test_subscribe_requires_client_and_target() {
        let hub = hub(HubConfig::default());
        let request = SyncRequest::new(vec![SyncTask::SubscribeChanges {
            container: "orders".to_string(),
            changes: vec![ChangeKind::Create],
            filter: None,
        }]);
        let response = hub.execute_sync(request, None);
        let error = response.results[0].as_error().unwrap();
        assert_eq!(error.kind, TaskErrorKind::InvalidTask);
        assert_eq!(hub.broker().subscriber_count(), 0);
    }

    #[test]
    fn test_malformed_task() {
        let hub = hub(HubConfig::default());
        let request = SyncRequest::new(vec![
            SyncTask::Create {
                container: String::new(),
                entities: vec![],
            },
            SyncTask::Message {
                name: "ping".to_string(),
                param: json!(null),
            },
        ]);
        let response = hub.execute_sync(request, None);
        assert_eq!(
            response.results[0].as_error().unwrap().kind,
            TaskErrorKind::InvalidTask
        );
        assert_eq!(response.results[1], TaskResult::Message);
    }

    #[test]
    fn test_failed_tasks_not_fanned_out() {
        let hub = hub(HubConfig::default());
        let (target, receiver) = hub.create_channel_target();
        let target: Arc<dyn EventTarget> = target;
        let subscribe = SyncRequest::new(vec![SyncTask::SubscribeMessage {
            name: "*".to_string(),
            remove: false,
        }])
        .with_client("a");
        hub.execute_sync(subscribe, Some(&target));

        // commands are not implemented by the executor, so nothing is sent
        let request = SyncRequest::new(vec![SyncTask::Command {
            name: "std.Echo".to_string(),
            param: json!(1),
        }])
        .with_client("b");
        let response = hub.execute_sync(request, None);
        assert!(response.results[0].is_error());
        assert_eq!(hub.broker().send_queued_events(), 0);
        assert!(receiver.try_recv().is_err());
    }
}
