use std::fmt;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use super::FieldType;
use crate::error::HydrationError;
use crate::json_ext::Value;

/// The coordinates of a field in the overall schema: `Type.field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldCoordinates {
    pub type_name: String,
    pub field_name: String,
}

impl FieldCoordinates {
    pub fn new(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }
}

impl fmt::Display for FieldCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

/// A field of the backing service, as seen by that service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    /// Argument types, by argument name. Only needed for arguments whose
    /// values must be sent as enum values.
    #[serde(default)]
    pub arguments: IndexMap<String, FieldType>,
}

/// Where the value of a backing field argument comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueSource {
    /// Copied from an argument of the hydrated field.
    ArgumentValue {
        argument_name: String,
        #[serde(default)]
        #[schemars(with = "Option<serde_json::Value>")]
        default_value: Option<Value>,
    },
    /// Read from the parent node. The batch argument.
    FieldResultValue {
        query_path_to_field: Vec<String>,
        field_type: FieldType,
    },
    StaticValue {
        #[schemars(with = "serde_json::Value")]
        value: Value,
    },
    /// Every listed hydrated field argument that was supplied, as one object.
    RemainingArguments { argument_names: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SourceArgument {
    /// Name of the backing field argument.
    pub name: String,
    pub value_source: ValueSource,
}

/// Correlates a parent node with a resolved object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectIdentifier {
    /// Query path to the identifier on the parent node.
    pub source_id: Vec<String>,
    /// Name of the identifier field on the resolved object.
    pub result_id: String,
}

/// How resolved objects are matched back to parent nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchStrategy {
    /// The n-th resolved object belongs to the n-th input.
    MatchIndex,
    MatchObjectIdentifier(ObjectIdentifier),
    /// A composite identifier.
    MatchObjectIdentifiers { identifiers: Vec<ObjectIdentifier> },
}

impl MatchStrategy {
    /// The identifiers to correlate on. Empty for index matching.
    pub fn identifiers(&self) -> &[ObjectIdentifier] {
        match self {
            MatchStrategy::MatchIndex => &[],
            MatchStrategy::MatchObjectIdentifier(identifier) => std::slice::from_ref(identifier),
            MatchStrategy::MatchObjectIdentifiers { identifiers } => identifiers.as_slice(),
        }
    }
}

/// A batch hydration declared on a field of the overall schema.
///
/// Built once when the blueprint is loaded and shared, read-only, by every
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BatchHydrationInstruction {
    /// The hydrated field.
    pub location: FieldCoordinates,
    /// Output type of the hydrated field in the overall schema.
    pub hydrated_field_type: FieldType,
    pub backing_service: String,
    /// Path from the query root to the backing field, e.g. `["usersByIds"]`.
    pub query_path_to_backing_field: Vec<String>,
    pub backing_field_def: FieldDefinition,
    pub batch_size: usize,
    pub source_arguments: Vec<SourceArgument>,
    pub match_strategy: MatchStrategy,
}

/// The argument carrying the batched inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BatchArgument<'a> {
    pub(crate) name: &'a str,
    pub(crate) query_path: &'a [String],
    pub(crate) field_type: &'a FieldType,
}

impl BatchHydrationInstruction {
    /// Find the single argument fed from the parent node.
    pub(crate) fn batch_argument(&self) -> Result<BatchArgument<'_>, HydrationError> {
        let mut candidates = self
            .source_arguments
            .iter()
            .filter_map(|argument| match &argument.value_source {
                ValueSource::FieldResultValue {
                    query_path_to_field,
                    field_type,
                } => Some(BatchArgument {
                    name: argument.name.as_str(),
                    query_path: query_path_to_field.as_slice(),
                    field_type,
                }),
                _ => None,
            });

        let first = candidates
            .next()
            .ok_or_else(|| HydrationError::MissingBatchArgument {
                field: self.location.to_string(),
            })?;
        let others = candidates.count();
        if others > 0 {
            return Err(HydrationError::DuplicateBatchArgument {
                field: self.location.to_string(),
                count: others + 1,
            });
        }
        Ok(first)
    }
}
