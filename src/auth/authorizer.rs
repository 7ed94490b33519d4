//! Composable task authorizers.

use crate::tasks::SyncTask;
use crate::types::{ChangeKind, OperationType, TaskType};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Decides whether a task may execute or a subscription may be granted.
///
/// Authorizers are stateless. Denial is a plain `false`, never an error.
#[derive(Clone, Debug)]
pub enum Authorizer {
    Allow,
    Deny,
    /// Authorizes if every child authorizes. Short-circuits on the first denial.
    All(Vec<Authorizer>),
    /// Authorizes if any child authorizes. An empty list authorizes nothing.
    Any(Vec<Authorizer>),
    ByTaskType(TaskType),
    /// Message and command tasks by name.
    ByMessageName(NameMatcher),
    BySubscribeMessageName(NameMatcher),
    ByContainer(ContainerAccess),
    BySubscribeChanges(SubscribeChangesAccess),
    ByPredicate(TaskPredicate),
}

impl Authorizer {
    pub fn by_container(container: impl Into<String>, operations: &[OperationType]) -> Self {
        Authorizer::ByContainer(ContainerAccess::new(container, operations))
    }

    pub fn by_message(name: &str) -> Self {
        Authorizer::ByMessageName(NameMatcher::new(name))
    }

    pub fn by_subscribe_message(name: &str) -> Self {
        Authorizer::BySubscribeMessageName(NameMatcher::new(name))
    }

    pub fn by_subscribe_changes(
        container: impl Into<String>,
        changes: impl IntoIterator<Item = ChangeKind>,
    ) -> Self {
        Authorizer::BySubscribeChanges(SubscribeChangesAccess {
            container: container.into(),
            changes: changes.into_iter().collect(),
        })
    }

    pub fn predicate<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&SyncTask) -> bool + Send + Sync + 'static,
    {
        Authorizer::ByPredicate(TaskPredicate {
            name: name.into(),
            func: Arc::new(func),
        })
    }

    pub fn authorize(&self, task: &SyncTask) -> bool {
        match self {
            Authorizer::Allow => true,
            Authorizer::Deny => false,
            Authorizer::All(list) => list.iter().all(|a| a.authorize(task)),
            Authorizer::Any(list) => list.iter().any(|a| a.authorize(task)),
            Authorizer::ByTaskType(task_type) => task.task_type() == *task_type,
            Authorizer::ByMessageName(matcher) => {
                task.message_name().is_some_and(|name| matcher.matches(name))
            }
            Authorizer::BySubscribeMessageName(matcher) => match task {
                SyncTask::SubscribeMessage { name, .. } => matcher.matches(name),
                _ => false,
            },
            Authorizer::ByContainer(access) => access.authorize(task),
            Authorizer::BySubscribeChanges(access) => access.authorize(task),
            Authorizer::ByPredicate(predicate) => (predicate.func)(task),
        }
    }
}

/// Exact or prefix name match. A trailing `*` selects prefix mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameMatcher {
    name: String,
    prefix: bool,
}

impl NameMatcher {
    pub fn new(name: &str) -> Self {
        match name.strip_suffix('*') {
            Some(prefix) => Self {
                name: prefix.to_string(),
                prefix: true,
            },
            None => Self {
                name: name.to_string(),
                prefix: false,
            },
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.prefix {
            name.starts_with(self.name.as_str())
        } else {
            name == self.name
        }
    }
}

/// Per-container operation flags. Shorthand operations are expanded here,
/// so evaluation only reads flags.
///
/// `Read` grants reads by id and by query. `Query` alone grants only queries,
/// aggregates and cursor cleanup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContainerAccess {
    pub container: String,
    pub create: bool,
    pub upsert: bool,
    pub delete: bool,
    pub patch: bool,
    pub read: bool,
    pub query: bool,
}

impl ContainerAccess {
    pub fn new(container: impl Into<String>, operations: &[OperationType]) -> Self {
        let mut access = ContainerAccess {
            container: container.into(),
            ..Default::default()
        };
        for op in operations {
            match op {
                OperationType::Create => access.create = true,
                OperationType::Upsert => access.upsert = true,
                OperationType::Delete => access.delete = true,
                OperationType::Patch => access.patch = true,
                OperationType::Read => {
                    access.read = true;
                    access.query = true;
                }
                OperationType::Query => access.query = true,
                OperationType::Mutate => {
                    access.create = true;
                    access.upsert = true;
                    access.delete = true;
                    access.patch = true;
                }
                OperationType::Full => {
                    access.create = true;
                    access.upsert = true;
                    access.delete = true;
                    access.patch = true;
                    access.read = true;
                    access.query = true;
                }
            }
        }
        access
    }

    fn authorize(&self, task: &SyncTask) -> bool {
        if task.container() != Some(self.container.as_str()) {
            return false;
        }
        match task {
            SyncTask::Create { .. } => self.create,
            SyncTask::Upsert { .. } => self.upsert,
            SyncTask::Delete { .. } => self.delete,
            SyncTask::Patch { .. } => self.patch,
            SyncTask::Read { .. } => self.read,
            SyncTask::Query { .. } | SyncTask::Aggregate { .. } | SyncTask::CloseCursors { .. } => {
                self.query
            }
            _ => false,
        }
    }
}

/// Change kinds a client may subscribe to on one container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeChangesAccess {
    pub container: String,
    pub changes: BTreeSet<ChangeKind>,
}

impl SubscribeChangesAccess {
    /// A request for any kind outside the allowed set is denied in full.
    fn authorize(&self, task: &SyncTask) -> bool {
        match task {
            SyncTask::SubscribeChanges {
                container, changes, ..
            } => {
                container == &self.container
                    && changes.iter().all(|kind| self.changes.contains(kind))
            }
            _ => false,
        }
    }
}

/// Named closure authorizer.
#[derive(Clone)]
pub struct TaskPredicate {
    name: String,
    func: Arc<dyn Fn(&SyncTask) -> bool + Send + Sync>,
}

impl fmt::Debug for TaskPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskPredicate({})", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn create(container: &str) -> SyncTask {
        SyncTask::Create {
            container: container.to_string(),
            entities: vec![json!({"id": 1})],
        }
    }

    fn query(container: &str) -> SyncTask {
        SyncTask::Query {
            container: container.to_string(),
            filter: None,
            limit: None,
        }
    }

    fn message(name: &str) -> SyncTask {
        SyncTask::Message {
            name: name.to_string(),
            param: Value::Null,
        }
    }

    #[test]
    fn test_all_container_and_task_type() {
        let auth = Authorizer::All(vec![
            Authorizer::by_container("Article", &[OperationType::Read]),
            Authorizer::ByTaskType(TaskType::Query),
        ]);
        assert!(auth.authorize(&query("Article")));
        assert!(!auth.authorize(&create("Article")));
        assert!(!auth.authorize(&query("Order")));

        let query_only = Authorizer::by_container("Article", &[OperationType::Query]);
        let read = SyncTask::Read {
            container: "Article".to_string(),
            ids: vec!["1".to_string()],
        };
        assert!(!query_only.authorize(&read));
    }

    #[test]
    fn test_any_empty_denies() {
        assert!(!Authorizer::Any(vec![]).authorize(&create("a")));
        assert!(Authorizer::All(vec![]).authorize(&create("a")));
    }

    #[test]
    fn test_any_short_circuits() {
        let auth = Authorizer::Any(vec![
            Authorizer::Allow,
            Authorizer::predicate("never", |_| panic!("must not be evaluated")),
        ]);
        assert!(auth.authorize(&create("a")));

        let auth = Authorizer::All(vec![
            Authorizer::Deny,
            Authorizer::predicate("never", |_| panic!("must not be evaluated")),
        ]);
        assert!(!auth.authorize(&create("a")));
    }

    #[test]
    fn test_container_shorthands() {
        let mutate = ContainerAccess::new("orders", &[OperationType::Mutate]);
        assert!(mutate.create && mutate.upsert && mutate.delete && mutate.patch);
        assert!(!mutate.read && !mutate.query);

        let full = Authorizer::by_container("orders", &[OperationType::Full]);
        assert!(full.authorize(&create("orders")));
        assert!(full.authorize(&query("orders")));
        assert!(!full.authorize(&create("users")));
        assert!(!full.authorize(&message("orders")));
    }

    #[test]
    fn test_message_name_prefix() {
        let auth = Authorizer::by_message("chat.*");
        assert!(auth.authorize(&message("chat.join")));
        assert!(auth.authorize(&message("chat.leave")));
        assert!(!auth.authorize(&message("chatroom")));

        let exact = Authorizer::by_message("std.Echo");
        assert!(exact.authorize(&SyncTask::Command {
            name: "std.Echo".to_string(),
            param: Value::Null,
        }));
        assert!(!exact.authorize(&message("std.EchoAll")));
    }

    #[test]
    fn test_subscribe_message_name() {
        let auth = Authorizer::by_subscribe_message("news.*");
        let task = SyncTask::SubscribeMessage {
            name: "news.sports".to_string(),
            remove: false,
        };
        assert!(auth.authorize(&task));
        // does not grant sending
        assert!(!auth.authorize(&message("news.sports")));
    }

    #[test]
    fn test_subscribe_changes_no_partial_grant() {
        let auth = Authorizer::by_subscribe_changes(
            "orders",
            [ChangeKind::Create, ChangeKind::Upsert],
        );
        let allowed = SyncTask::SubscribeChanges {
            container: "orders".to_string(),
            changes: vec![ChangeKind::Create],
            filter: None,
        };
        assert!(auth.authorize(&allowed));

        let too_much = SyncTask::SubscribeChanges {
            container: "orders".to_string(),
            changes: vec![ChangeKind::Create, ChangeKind::Delete],
            filter: None,
        };
        assert!(!auth.authorize(&too_much));

        let other = SyncTask::SubscribeChanges {
            container: "users".to_string(),
            changes: vec![ChangeKind::Create],
            filter: None,
        };
        assert!(!auth.authorize(&other));
    }

    #[test]
    fn test_predicate() {
        let auth = Authorizer::predicate("small batches", |task| match task {
            SyncTask::Create { entities, .. } => entities.len() <= 1,
            _ => true,
        });
        assert!(auth.authorize(&create("a")));
        let big = SyncTask::Create {
            container: "a".to_string(),
            entities: vec![json!({}), json!({})],
        };
        assert!(!auth.authorize(&big));
        assert_eq!(
            format!("{:?}", auth),
            "ByPredicate(TaskPredicate(small batches))"
        );
    }
}
