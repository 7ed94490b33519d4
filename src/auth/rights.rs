//! Serializable access rights, loaded from configuration.

use super::authorizer::Authorizer;
use crate::types::{ChangeKind, OperationType, TaskType};
use serde::{Deserialize, Serialize};

/// Configuration form of an [`Authorizer`].
///
/// ```ignore
/// let right: Right = serde_json::from_str(r#"{
///     "type": "all",
///     "rights": [
///         { "type": "container", "name": "orders", "operations": ["read", "mutate"] },
///         { "type": "message", "names": ["chat.*"] }
///     ]
/// }"#)?;
/// let authorizer = right.to_authorizer();
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Right {
    #[default]
    Allow,
    Deny,
    All {
        rights: Vec<Right>,
    },
    Any {
        rights: Vec<Right>,
    },
    Task {
        types: Vec<TaskType>,
    },
    Message {
        names: Vec<String>,
    },
    SubscribeMessage {
        names: Vec<String>,
    },
    Container {
        name: String,
        #[serde(default)]
        operations: Vec<OperationType>,
        #[serde(default, rename = "subscribeChanges")]
        subscribe_changes: Vec<ChangeKind>,
    },
}

impl Right {
    pub fn to_authorizer(&self) -> Authorizer {
        match self {
            Right::Allow => Authorizer::Allow,
            Right::Deny => Authorizer::Deny,
            Right::All { rights } => {
                Authorizer::All(rights.iter().map(Right::to_authorizer).collect())
            }
            Right::Any { rights } => {
                Authorizer::Any(rights.iter().map(Right::to_authorizer).collect())
            }
            Right::Task { types } => {
                any_of(types.iter().map(|t| Authorizer::ByTaskType(*t)).collect())
            }
            Right::Message { names } => {
                any_of(names.iter().map(|n| Authorizer::by_message(n)).collect())
            }
            Right::SubscribeMessage { names } => any_of(
                names
                    .iter()
                    .map(|n| Authorizer::by_subscribe_message(n))
                    .collect(),
            ),
            Right::Container {
                name,
                operations,
                subscribe_changes,
            } => {
                let mut list = vec![Authorizer::by_container(name.clone(), operations)];
                if !subscribe_changes.is_empty() {
                    list.push(Authorizer::by_subscribe_changes(
                        name.clone(),
                        subscribe_changes.iter().copied(),
                    ));
                }
                any_of(list)
            }
        }
    }
}

/// Unwraps single-element lists so simple rights stay flat.
fn any_of(mut list: Vec<Authorizer>) -> Authorizer {
    if list.len() == 1 {
        list.remove(0)
    } else {
        Authorizer::Any(list)
    }
}
