use std::collections::HashMap;

use tracing::warn;

use super::arguments::is_absent;
use super::dispatch::ResolvedObjectBatch;
use super::ParentNode;
use super::ResultInstruction;
use crate::blueprint::BatchHydrationInstruction;
use crate::error::HydrationError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::query::AliasHelper;

static NULL: Value = Value::Null;

/// The identifier values of one object, in declaration order.
///
/// Two keys are equal when every component is equal. A key made only of
/// `null`s is never built: it means there is nothing to match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdentifierKey(String);

impl IdentifierKey {
    fn new(values: &[&Value]) -> Option<Self> {
        if values.iter().all(|value| value.is_null()) {
            return None;
        }
        serde_json::to_string(values).ok().map(IdentifierKey)
    }
}

/// Resolved objects by identifier, with the injected identifier selections
/// projected out.
struct ResolvedIndex {
    objects: HashMap<IdentifierKey, Value>,
}

impl ResolvedIndex {
    fn new(
        instruction: &BatchHydrationInstruction,
        aliases: &AliasHelper,
        resolved: &[ResolvedObjectBatch],
    ) -> Result<Self, HydrationError> {
        let hidden: Vec<String> = instruction
            .match_strategy
            .identifiers()
            .iter()
            .map(|identifier| aliases.artificial_key(&identifier.result_id))
            .collect();

        let mut objects = HashMap::new();
        for batch in resolved {
            let items = match batch.backing_value(instruction) {
                Some(Value::Array(items)) => items,
                None | Some(Value::Null) => continue,
                Some(_) => {
                    return Err(HydrationError::ExpectedListResult {
                        field: instruction.location.to_string(),
                    })
                }
            };

            for item in items {
                let object = match item {
                    Value::Object(object) => object,
                    Value::Null => continue,
                    other => {
                        failfast_debug!(
                            field = %instruction.location,
                            "skipping resolved value that is not an object: {other:?}"
                        );
                        continue;
                    }
                };
                let values: Vec<&Value> = hidden
                    .iter()
                    .map(|key| object.get(key.as_str()).unwrap_or(&NULL))
                    .collect();
                let Some(key) = IdentifierKey::new(&values) else {
                    continue;
                };
                let visible: Object = object
                    .iter()
                    .filter(|(name, _)| !hidden.iter().any(|hidden| hidden == name.as_str()))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                if objects.insert(key, Value::Object(visible)).is_some() {
                    warn!(
                        field = %instruction.location,
                        "several resolved objects share the same identifier, keeping the last one"
                    );
                }
            }
        }
        Ok(Self { objects })
    }

    fn get(&self, key: Option<&IdentifierKey>) -> Value {
        key.and_then(|key| self.objects.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// The path shared by every source path.
fn common_prefix(paths: &[Path]) -> Path {
    let Some((first, rest)) = paths.split_first() else {
        return Path::empty();
    };
    let length = first
        .iter()
        .enumerate()
        .take_while(|(index, element)| {
            rest.iter()
                .all(|path| path.0.get(*index) == Some(*element))
        })
        .count();
    Path(first.0[..length].to_vec())
}

/// One identifier key per source element of the parent.
///
/// Source paths are resolved from their common prefix: every node found there
/// (lists flattened) is one source element, and each identifier is read at
/// the rest of its path from that node.
fn parent_keys(parent: &Value, prefix: &Path, source_paths: &[Path]) -> Vec<Option<IdentifierKey>> {
    parent
        .nodes_at(prefix, true)
        .into_iter()
        .map(|(_, node)| {
            let values: Vec<&Value> = source_paths
                .iter()
                .map(|path| {
                    let remainder = Path(path.0[prefix.len()..].to_vec());
                    if remainder.is_empty() {
                        node
                    } else {
                        node.get_path(&remainder).unwrap_or(&NULL)
                    }
                })
                .collect();
            IdentifierKey::new(&values)
        })
        .collect()
}

/// Match resolved objects to parent nodes by identifier.
///
/// Resolution order does not matter. A list-typed hydrated field receives one
/// entry per source element, unmatched elements giving `null`, or `null` as a
/// whole when no element carries an identifier. A single-valued hydrated
/// field receives the object matching its single source element.
pub(super) fn match_by_identifier(
    instruction: &BatchHydrationInstruction,
    aliases: &AliasHelper,
    result_key: &str,
    parents: &[&ParentNode<'_>],
    resolved: &[ResolvedObjectBatch],
) -> Result<Vec<ResultInstruction>, HydrationError> {
    let index = ResolvedIndex::new(instruction, aliases, resolved)?;
    let source_paths: Vec<Path> = instruction
        .match_strategy
        .identifiers()
        .iter()
        .map(|identifier| Path::from_slice(&aliases.query_path(&identifier.source_id)))
        .collect();
    let prefix = common_prefix(&source_paths);
    let is_list = instruction.hydrated_field_type.is_list();

    let mut instructions = Vec::with_capacity(parents.len());
    for parent in parents {
        let path = parent.path.with_key(result_key);
        if is_absent(parent.value, &prefix) {
            instructions.push(ResultInstruction::set(path, Value::Null));
            continue;
        }

        let keys = parent_keys(parent.value, &prefix, &source_paths);
        let value = if is_list {
            // no identifier at all, including an empty list, means no linkage data
            if keys.iter().all(Option::is_none) {
                Value::Null
            } else {
                Value::Array(keys.iter().map(|key| index.get(key.as_ref())).collect())
            }
        } else {
            match keys.as_slice() {
                [] => Value::Null,
                [key] => index.get(key.as_ref()),
                _ => {
                    return Err(HydrationError::ExpectedSingleSourceId {
                        field: instruction.location.to_string(),
                        count: keys.len(),
                    })
                }
            }
        };
        instructions.push(ResultInstruction::set(path, value));
    }

    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::blueprint::FieldCoordinates;
    use crate::blueprint::FieldDefinition;
    use crate::blueprint::MatchStrategy;
    use crate::blueprint::ObjectIdentifier;
    use crate::graphql;
    use crate::query::Field;

    fn identifier(source_id: &[&str], result_id: &str) -> ObjectIdentifier {
        ObjectIdentifier {
            source_id: source_id.iter().map(|s| s.to_string()).collect(),
            result_id: result_id.to_string(),
        }
    }

    fn instruction(hydrated_type: &str, identifiers: Vec<ObjectIdentifier>) -> BatchHydrationInstruction {
        BatchHydrationInstruction {
            location: FieldCoordinates::new("Issue", "authors"),
            hydrated_field_type: hydrated_type.parse().unwrap(),
            backing_service: "users".to_string(),
            query_path_to_backing_field: vec!["usersByIds".to_string()],
            backing_field_def: FieldDefinition {
                name: "usersByIds".to_string(),
                field_type: "[User]".parse().unwrap(),
                arguments: Default::default(),
            },
            batch_size: 50,
            source_arguments: vec![],
            match_strategy: if identifiers.len() == 1 {
                MatchStrategy::MatchObjectIdentifier(identifiers[0].clone())
            } else {
                MatchStrategy::MatchObjectIdentifiers { identifiers }
            },
        }
    }

    fn resolved(data: Value) -> ResolvedObjectBatch {
        ResolvedObjectBatch {
            source_inputs: vec![],
            result: graphql::Response::builder().data(data).build(),
        }
    }

    fn run(
        instruction: &BatchHydrationInstruction,
        data: &Value,
        resolved: &[ResolvedObjectBatch],
    ) -> Result<Vec<Value>, HydrationError> {
        let aliases = AliasHelper::for_field(&Field::builder().name("authors").build());
        let parents = ParentNode::select(data, &Path::from("issues"));
        let parents: Vec<_> = parents.iter().collect();
        match_by_identifier(instruction, &aliases, "authors", &parents, resolved).map(
            |instructions| {
                instructions
                    .into_iter()
                    .map(|instruction| match instruction {
                        ResultInstruction::Set { value, .. } => value,
                    })
                    .collect()
            },
        )
    }

    #[test]
    fn follows_source_order_and_hides_identifiers() {
        let data = json!({"issues": [
            {"batch_hydration__authors__authorIds": ["user-100", "user-20"]},
        ]});
        let resolved = vec![resolved(json!({"usersByIds": [
            {"batch_hydration__authors__id": "user-20", "name": "Newmarket"},
            {"batch_hydration__authors__id": "user-100", "name": "Spaces"},
        ]}))];
        assert_eq!(
            run(
                &instruction("[User]", vec![identifier(&["authorIds"], "id")]),
                &data,
                &resolved
            )
            .unwrap(),
            vec![json!([{"name": "Spaces"}, {"name": "Newmarket"}])]
        );
    }

    #[test]
    fn misses_resolve_to_null() {
        let data = json!({"issues": [
            {"batch_hydration__authors__authorIds": ["user-1", null, "user-404"]},
            {"batch_hydration__authors__authorIds": []},
            {"batch_hydration__authors__authorIds": null},
        ]});
        let resolved = vec![
            resolved(json!({"usersByIds": [
                {"batch_hydration__authors__id": "user-1", "name": "One"},
                null,
            ]})),
            resolved(Value::Null),
        ];
        assert_eq!(
            run(
                &instruction("[User]", vec![identifier(&["authorIds"], "id")]),
                &data,
                &resolved
            )
            .unwrap(),
            vec![json!([{"name": "One"}, null, null]), Value::Null, Value::Null]
        );
    }

    #[test]
    fn empty_source_list_resolves_to_null() {
        let data = json!({"issues": [
            {"batch_hydration__authors__authorIds": []},
            {"batch_hydration__authors__authorIds": [null, null]},
            {"batch_hydration__authors__authorIds": ["user-1"]},
        ]});
        let resolved = vec![resolved(json!({"usersByIds": [
            {"batch_hydration__authors__id": "user-1", "name": "One"},
        ]}))];
        assert_eq!(
            run(
                &instruction("[User]", vec![identifier(&["authorIds"], "id")]),
                &data,
                &resolved
            )
            .unwrap(),
            vec![Value::Null, Value::Null, json!([{"name": "One"}])]
        );
    }

    #[test]
    fn composite_keys_match_every_component() {
        let data = json!({"issues": [
            {"batch_hydration__authors__owners": [
                {"id": "1", "site": "a"},
                {"id": "1", "site": "b"},
            ]},
            {"batch_hydration__authors__owners": [{"id": null, "site": null}]},
        ]});
        let resolved = vec![resolved(json!({"usersByIds": [
            {"batch_hydration__authors__id": "1", "batch_hydration__authors__siteId": "b", "name": "B"},
            {"batch_hydration__authors__id": "1", "batch_hydration__authors__siteId": "a", "name": "A"},
        ]}))];
        let instruction = instruction(
            "[User]",
            vec![
                identifier(&["owners", "id"], "id"),
                identifier(&["owners", "site"], "siteId"),
            ],
        );
        assert_eq!(
            run(&instruction, &data, &resolved).unwrap(),
            vec![json!([{"name": "A"}, {"name": "B"}]), Value::Null]
        );
    }

    #[test]
    fn single_valued_fields_take_the_matching_object() {
        let data = json!({"issues": [
            {"batch_hydration__authors__authorId": "2"},
            {"batch_hydration__authors__authorId": "3"},
            {"id": "no author"},
        ]});
        let resolved = vec![resolved(json!({"usersByIds": [
            {"batch_hydration__authors__id": "2", "batch_hydration__authors__id2": 1, "id": "2"},
        ]}))];
        assert_eq!(
            run(
                &instruction("User", vec![identifier(&["authorId"], "id")]),
                &data,
                &resolved
            )
            .unwrap(),
            vec![
                json!({"batch_hydration__authors__id2": 1, "id": "2"}),
                Value::Null,
                Value::Null
            ]
        );
    }

    #[test]
    fn single_valued_fields_reject_several_sources() {
        let data = json!({"issues": [{"batch_hydration__authors__authorId": ["1", "2"]}]});
        assert_eq!(
            run(
                &instruction("User", vec![identifier(&["authorId"], "id")]),
                &data,
                &[]
            )
            .unwrap_err(),
            HydrationError::ExpectedSingleSourceId {
                field: "Issue.authors".to_string(),
                count: 2,
            }
        );
    }

    /// Duplicate identifiers are tolerated and the last resolved object wins.
    /// This mirrors long standing behaviour; it may hide a backing service bug.
    #[test]
    fn duplicate_identifiers_keep_the_last_object() {
        let data = json!({"issues": [{"batch_hydration__authors__authorIds": ["1"]}]});
        let resolved = vec![
            resolved(json!({"usersByIds": [{"batch_hydration__authors__id": "1", "name": "first"}]})),
            resolved(json!({"usersByIds": [{"batch_hydration__authors__id": "1", "name": "second"}]})),
        ];
        assert_eq!(
            run(
                &instruction("[User]", vec![identifier(&["authorIds"], "id")]),
                &data,
                &resolved
            )
            .unwrap(),
            vec![json!([{"name": "second"}])]
        );
    }

    #[test]
    fn finds_the_common_prefix() {
        assert_eq!(
            common_prefix(&[Path::from("a/b/c"), Path::from("a/b/d")]),
            Path::from("a/b")
        );
        assert_eq!(common_prefix(&[Path::from("a/b")]), Path::from("a/b"));
        assert_eq!(common_prefix(&[Path::from("a"), Path::from("b")]), Path::empty());
        assert_eq!(common_prefix(&[]), Path::empty());
    }
}
