//! Builds the subscriber-specific copy of a container mutation.

use serde_json::Value;

use super::filter::CompiledFilter;
use super::types::SyncTask;
use crate::events::ChangeSubscription;

/// Returns the part of `task` that `subscription` is entitled to see.
///
/// `None` if the task is not a mutation of the subscribed container or its
/// change kind is not subscribed. A matching task whose filtered entity list
/// ends up empty is still returned.
pub fn filter_changes(task: &SyncTask, subscription: &ChangeSubscription) -> Option<SyncTask> {
    let kind = task.change_kind()?;
    if task.container() != Some(subscription.container.as_str())
        || !subscription.changes.contains(&kind)
    {
        return None;
    }
    let Some(filter) = &subscription.filter else {
        return Some(task.clone());
    };
    // one evaluator per (task, subscription), shared by all entities
    let compiled = filter.compile();
    let filtered = match task {
        SyncTask::Create {
            container,
            entities,
        } => SyncTask::Create {
            container: container.clone(),
            entities: retain_matching(entities, &compiled),
        },
        SyncTask::Upsert {
            container,
            entities,
        } => SyncTask::Upsert {
            container: container.clone(),
            entities: retain_matching(entities, &compiled),
        },
        SyncTask::Patch { container, patches } => SyncTask::Patch {
            container: container.clone(),
            patches: patches
                .iter()
                .filter(|p| compiled.matches(&p.patch))
                .cloned()
                .collect(),
        },
        // ids only, nothing to evaluate the filter against
        SyncTask::Delete { .. } => task.clone(),
        _ => return None,
    };
    Some(filtered)
}

fn retain_matching(entities: &[Value], filter: &CompiledFilter) -> Vec<Value> {
    entities
        .iter()
        .filter(|entity| filter.matches(entity))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{EntityPatch, JsonFilter};
    use crate::types::ChangeKind;
    use serde_json::json;

    fn subscription(kinds: &[ChangeKind], filter: Option<JsonFilter>) -> ChangeSubscription {
        ChangeSubscription::new("orders", kinds.iter().copied(), filter)
    }

    #[test]
    fn test_filter_keeps_matching_entities() {
        let task = SyncTask::Create {
            container: "orders".to_string(),
            entities: vec![json!({"id": 1, "x": 1}), json!({"id": 2, "x": 2})],
        };
        let sub = subscription(&[ChangeKind::Create], Some(JsonFilter::equal("x", 1)));

        let filtered = filter_changes(&task, &sub).unwrap();
        match filtered {
            SyncTask::Create { entities, .. } => {
                assert_eq!(entities, vec![json!({"id": 1, "x": 1})]);
            }
            other => panic!("Expected create task, got {:?}", other),
        }
    }

    #[test]
    fn test_no_filter_passes_task_unchanged() {
        let task = SyncTask::Upsert {
            container: "orders".to_string(),
            entities: vec![json!({"id": 1}), json!({"id": 2})],
        };
        let sub = subscription(&[ChangeKind::Upsert], None);
        assert_eq!(filter_changes(&task, &sub), Some(task));
    }

    #[test]
    fn test_unsubscribed_kind_or_container() {
        let task = SyncTask::Create {
            container: "orders".to_string(),
            entities: vec![json!({"id": 1})],
        };
        let upsert_only = subscription(&[ChangeKind::Upsert], None);
        assert!(filter_changes(&task, &upsert_only).is_none());

        let other = ChangeSubscription::new("articles", [ChangeKind::Create], None);
        assert!(filter_changes(&task, &other).is_none());
    }

    #[test]
    fn test_empty_match_still_attached() {
        let task = SyncTask::Create {
            container: "orders".to_string(),
            entities: vec![json!({"id": 2, "x": 2})],
        };
        let sub = subscription(&[ChangeKind::Create], Some(JsonFilter::equal("x", 1)));
        match filter_changes(&task, &sub) {
            Some(SyncTask::Create { entities, .. }) => assert!(entities.is_empty()),
            other => panic!("Expected empty create task, got {:?}", other),
        }
    }

    #[test]
    fn test_patch_and_delete_filtering() {
        let patch = SyncTask::Patch {
            container: "orders".to_string(),
            patches: vec![
                EntityPatch {
                    id: "1".to_string(),
                    patch: json!({"state": "paid"}),
                },
                EntityPatch {
                    id: "2".to_string(),
                    patch: json!({"state": "open"}),
                },
            ],
        };
        let sub = subscription(
            &[ChangeKind::Patch, ChangeKind::Delete],
            Some(JsonFilter::equal("state", "paid")),
        );
        match filter_changes(&patch, &sub) {
            Some(SyncTask::Patch { patches, .. }) => {
                assert_eq!(patches.len(), 1);
                assert_eq!(patches[0].id, "1");
            }
            other => panic!("Expected patch task, got {:?}", other),
        }

        let delete = SyncTask::Delete {
            container: "orders".to_string(),
            ids: vec!["1".to_string(), "2".to_string()],
        };
        assert_eq!(filter_changes(&delete, &sub), Some(delete));
    }

    #[test]
    fn test_non_mutation_ignored() {
        let task = SyncTask::Query {
            container: "orders".to_string(),
            filter: None,
            limit: None,
        };
        let sub = subscription(&ChangeKind::ALL, None);
        assert!(filter_changes(&task, &sub).is_none());
    }
}
