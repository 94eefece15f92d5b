//! The hydration blueprint: which fields are hydrated, and how.
//!
//! The blueprint is compiled once from the overall schema and shared by every
//! request. It also carries the slice of each service's type system that
//! hydration needs to translate type names and resolve abstract types.

use std::collections::HashMap;
use std::sync::Arc;

use displaydoc::Display;
use indexmap::IndexMap;
use indexmap::IndexSet;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

mod field_type;
mod instruction;

pub use field_type::FieldType;
pub use field_type::InvalidFieldType;
pub(crate) use instruction::BatchArgument;
pub use instruction::BatchHydrationInstruction;
pub use instruction::FieldCoordinates;
pub use instruction::FieldDefinition;
pub use instruction::MatchStrategy;
pub use instruction::ObjectIdentifier;
pub use instruction::SourceArgument;
pub use instruction::ValueSource;

use crate::error::HydrationError;

/// Errors raised while loading a blueprint.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BlueprintError {
    /// could not parse blueprint: {0}
    Parse(String),

    /// hydration of '{field}' declares a batch size of 0
    ZeroBatchSize { field: String },

    /// hydration of '{field}' has an empty backing field path
    EmptyBackingFieldPath { field: String },

    /// hydration of '{field}' declares an empty object identifier
    EmptyObjectIdentifier { field: String },

    /// {0}
    Instruction(#[from] HydrationError),
}

/// A type of a service schema, reduced to what type resolution needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDefinition {
    Object,
    Interface { implementations: Vec<String> },
    Union { members: Vec<String> },
    Scalar,
    Enum,
}

/// What the blueprint knows about one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ServiceBlueprint {
    /// Types of the service, by underlying name.
    #[serde(default)]
    pub types: IndexMap<String, TypeDefinition>,
    /// Overall type name to underlying type name, for renamed types only.
    #[serde(default)]
    pub type_renames: IndexMap<String, String>,
}

/// The serialized form of a [`Blueprint`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BlueprintDefinition {
    #[serde(default)]
    pub services: IndexMap<String, ServiceBlueprint>,
    #[serde(default)]
    pub instructions: Vec<BatchHydrationInstruction>,
}

/// The compiled hydration blueprint.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "BlueprintDefinition")]
pub struct Blueprint {
    services: IndexMap<String, ServiceBlueprint>,
    instructions: HashMap<FieldCoordinates, Vec<Arc<BatchHydrationInstruction>>>,
}

#[buildstructor::buildstructor]
impl Blueprint {
    /// Build a blueprint without validating it.
    ///
    /// Instructions are kept in declaration order per field, which is the
    /// order candidates are offered to an instruction picker.
    #[builder(visibility = "pub")]
    fn new(
        services: IndexMap<String, ServiceBlueprint>,
        instructions: Vec<BatchHydrationInstruction>,
    ) -> Self {
        let mut by_coordinates: HashMap<FieldCoordinates, Vec<Arc<BatchHydrationInstruction>>> =
            HashMap::new();
        for instruction in instructions {
            by_coordinates
                .entry(instruction.location.clone())
                .or_default()
                .push(Arc::new(instruction));
        }
        Self {
            services,
            instructions: by_coordinates,
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, BlueprintError> {
        serde_yaml::from_str(yaml).map_err(|e| BlueprintError::Parse(e.to_string()))
    }

    /// Check every instruction is usable.
    pub fn validate(&self) -> Result<(), BlueprintError> {
        for instruction in self.instructions.values().flatten() {
            let field = instruction.location.to_string();
            if instruction.batch_size == 0 {
                return Err(BlueprintError::ZeroBatchSize { field });
            }
            if instruction.query_path_to_backing_field.is_empty() {
                return Err(BlueprintError::EmptyBackingFieldPath { field });
            }
            instruction.batch_argument()?;
            let identifiers = instruction.match_strategy.identifiers();
            if !matches!(instruction.match_strategy, MatchStrategy::MatchIndex)
                && (identifiers.is_empty()
                    || identifiers.iter().any(|identifier| {
                        identifier.source_id.is_empty() || identifier.result_id.is_empty()
                    }))
            {
                return Err(BlueprintError::EmptyObjectIdentifier { field });
            }
        }
        Ok(())
    }

    /// The batch hydrations declared on `type_name.field_name`.
    pub fn instructions_for_field(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> &[Arc<BatchHydrationInstruction>] {
        self.instructions
            .get(&FieldCoordinates::new(type_name, field_name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Translate a type name used by `service` to the overall schema.
    pub fn overall_type_name<'a>(&'a self, service: &str, underlying: &'a str) -> &'a str {
        self.services
            .get(service)
            .and_then(|service| {
                service
                    .type_renames
                    .iter()
                    .find(|(_, renamed)| renamed.as_str() == underlying)
                    .map(|(overall, _)| overall.as_str())
            })
            .unwrap_or(underlying)
    }

    /// Translate an overall type name to the name `service` knows it by.
    pub fn underlying_type_name<'a>(&'a self, service: &str, overall: &'a str) -> &'a str {
        self.services
            .get(service)
            .and_then(|service| service.type_renames.get(overall))
            .map(String::as_str)
            .unwrap_or(overall)
    }

    /// Concrete object types of `service` that `type_name` (an underlying
    /// name) may resolve to: implementations of an interface, members of a
    /// union, or the object type itself.
    ///
    /// Empty when the type is unknown or not an output composite type.
    pub fn object_types_of(&self, service: &str, type_name: &str) -> Vec<String> {
        let Some(service) = self.services.get(service) else {
            return Vec::new();
        };

        let mut visited = IndexSet::new();
        let mut objects = IndexSet::new();
        let mut pending = vec![type_name];
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            match service.types.get(current) {
                Some(TypeDefinition::Object) => {
                    objects.insert(current.to_string());
                }
                Some(TypeDefinition::Interface {
                    implementations: possible,
                })
                | Some(TypeDefinition::Union { members: possible }) => {
                    pending.extend(possible.iter().rev().map(String::as_str));
                }
                Some(TypeDefinition::Scalar) | Some(TypeDefinition::Enum) | None => {}
            }
        }
        objects.into_iter().collect()
    }

    /// Arguments of the backing field whose type is an enum of the backing
    /// service.
    pub fn enum_arguments(&self, instruction: &BatchHydrationInstruction) -> Vec<String> {
        let Some(service) = self.services.get(&instruction.backing_service) else {
            return Vec::new();
        };
        instruction
            .backing_field_def
            .arguments
            .iter()
            .filter(|(_, argument_type)| {
                matches!(
                    service.types.get(argument_type.inner_type_name()),
                    Some(TypeDefinition::Enum)
                )
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Whether `type_name` of `service` is an object type.
    pub fn is_object_type(&self, service: &str, type_name: &str) -> bool {
        self.services
            .get(service)
            .and_then(|service| service.types.get(type_name))
            .is_some_and(|definition| matches!(definition, TypeDefinition::Object))
    }
}

impl TryFrom<BlueprintDefinition> for Blueprint {
    type Error = BlueprintError;

    fn try_from(definition: BlueprintDefinition) -> Result<Self, Self::Error> {
        let blueprint = Blueprint::new(definition.services, definition.instructions);
        blueprint.validate()?;
        Ok(blueprint)
    }
}
