use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use tracing::debug;
use tracing::instrument;

use super::arguments;
use super::dispatch;
use super::identifiers;
use super::index;
use super::object_id;
use super::picker::DefaultInstructionPicker;
use super::picker::InstructionPicker;
use super::HydrationResult;
use super::ParentNode;
use super::ResultInstruction;
use crate::blueprint::BatchHydrationInstruction;
use crate::blueprint::Blueprint;
use crate::blueprint::MatchStrategy;
use crate::configuration::Configuration;
use crate::error::HydrationError;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::query::AliasHelper;
use crate::query::Field;
use crate::services::ServiceRegistry;

/// What transforms know about the query being executed.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub blueprint: Arc<Blueprint>,
    pub services: ServiceRegistry,
    pub configuration: Arc<Configuration>,
    /// The service the transformed query is sent to.
    pub service_name: String,
}

#[buildstructor::buildstructor]
impl ExecutionContext {
    #[builder(visibility = "pub")]
    fn new(
        blueprint: Arc<Blueprint>,
        services: ServiceRegistry,
        configuration: Option<Arc<Configuration>>,
        service_name: String,
    ) -> Self {
        Self {
            blueprint,
            services,
            configuration: configuration.unwrap_or_default(),
            service_name,
        }
    }
}

/// How a transform rewrote a field of the outgoing query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformFieldResult {
    /// The field to send in place of the original one, if any.
    pub new_field: Option<Field>,
    /// Selections to add next to it, on the same parent.
    pub artificial_fields: Vec<Field>,
}

/// A step of the query transform pipeline.
///
/// A transform is asked whether it applies to each field of the overall
/// query. When it does, it rewrites the field before the query is sent, then
/// turns the service's answer into result instructions.
#[async_trait]
pub trait Transform: Send + Sync {
    type State: Send + Sync;

    /// `None` when the transform has nothing to do with `field`.
    fn is_applicable(&self, context: &ExecutionContext, field: &Field) -> Option<Self::State>;

    fn transform_field(
        &self,
        context: &ExecutionContext,
        state: &Self::State,
    ) -> Result<TransformFieldResult, HydrationError>;

    /// `parents` are the nodes of the service result holding the field.
    async fn get_result_instructions(
        &self,
        context: &ExecutionContext,
        state: &Self::State,
        parents: &[ParentNode<'_>],
    ) -> Result<HydrationResult, HydrationError>;
}

/// Per field state of [`BatchHydrationTransform`].
#[derive(Debug, Clone)]
pub struct BatchHydrationState {
    field: Field,
    aliases: AliasHelper,
    /// Candidate instructions by overall object type.
    instructions: IndexMap<String, Vec<Arc<BatchHydrationInstruction>>>,
}

impl BatchHydrationState {
    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn aliases(&self) -> &AliasHelper {
        &self.aliases
    }

    /// Whether parents must say which object type they are.
    fn needs_type_discriminator(&self) -> bool {
        self.field.object_types.len() > 1
    }
}

/// Resolves batch hydrated fields.
#[derive(Clone)]
pub struct BatchHydrationTransform {
    picker: Arc<dyn InstructionPicker>,
}

impl Default for BatchHydrationTransform {
    fn default() -> Self {
        Self::new(Arc::new(DefaultInstructionPicker))
    }
}

impl std::fmt::Debug for BatchHydrationTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchHydrationTransform").finish_non_exhaustive()
    }
}

impl BatchHydrationTransform {
    /// A transform that asks `picker` when several instructions could
    /// hydrate the same parent.
    pub fn new(picker: Arc<dyn InstructionPicker>) -> Self {
        Self { picker }
    }

    /// The instructions that may hydrate `parent`, by its object type.
    fn candidates<'s>(
        &self,
        context: &ExecutionContext,
        state: &'s BatchHydrationState,
        parent: &ParentNode<'_>,
    ) -> Result<Option<&'s [Arc<BatchHydrationInstruction>]>, HydrationError> {
        let object_type = if state.needs_type_discriminator() {
            let key = state.aliases.type_name_result_key();
            let underlying = parent
                .value
                .get_path(&Path::from_slice(&[key]))
                .and_then(Value::as_str)
                .ok_or_else(|| HydrationError::MissingTypeDiscriminator {
                    path: parent.path.clone(),
                })?;
            context
                .blueprint
                .overall_type_name(&context.service_name, underlying)
                .to_string()
        } else {
            match state.field.object_types.first() {
                Some(object_type) => object_type.clone(),
                None => return Ok(None),
            }
        };
        Ok(state.instructions.get(&object_type).map(Vec::as_slice))
    }

    /// Hydrate every parent that `instruction` was picked for.
    async fn hydrate(
        &self,
        context: &ExecutionContext,
        state: &BatchHydrationState,
        instruction: &BatchHydrationInstruction,
        parents: &[&ParentNode<'_>],
    ) -> Result<HydrationResult, HydrationError> {
        let result_key = state.field.result_key();
        let batch_argument = instruction.batch_argument()?;
        let service = context
            .services
            .get(&instruction.backing_service)
            .ok_or_else(|| HydrationError::UnknownService {
                service: instruction.backing_service.clone(),
            })?;
        let input_path = Path::from_slice(&state.aliases.query_path(batch_argument.query_path));
        let batch_size = context
            .configuration
            .hydration
            .effective_batch_size(instruction.batch_size);

        let batches = arguments::build_batches(
            instruction,
            batch_argument,
            &state.field.arguments,
            parents,
            &input_path,
            batch_size,
        );

        let mut selections =
            identifiers::identifier_fields(&context.blueprint, instruction, &state.aliases)?;
        for child in backing_selections(&context.blueprint, instruction, &state.field.children) {
            Field::merge_into(&mut selections, child);
        }

        let resolved = if batches.is_empty() {
            Vec::new()
        } else {
            dispatch::dispatch(
                service,
                instruction,
                batches,
                &context.blueprint.enum_arguments(instruction),
                &selections,
                context.configuration.hydration.timeout,
            )
            .await?
        };

        let error_path = parents
            .first()
            .map(|parent| parent.path.keys_only().with_key(result_key));
        let errors = resolved
            .iter()
            .flat_map(|batch| batch.result.errors.iter())
            .map(|error| {
                let mut error = error.clone();
                error.path = error_path.clone();
                error
            })
            .collect();

        let instructions = match instruction.match_strategy {
            MatchStrategy::MatchIndex => index::match_by_index(
                instruction,
                batch_argument,
                result_key,
                parents,
                &input_path,
                &resolved,
                batch_size,
            )?,
            MatchStrategy::MatchObjectIdentifier(_)
            | MatchStrategy::MatchObjectIdentifiers { .. } => object_id::match_by_identifier(
                instruction,
                &state.aliases,
                result_key,
                parents,
                &resolved,
            )?,
        };

        Ok(HydrationResult {
            instructions,
            errors,
        })
    }
}

/// The client's selection on the hydrated field, with type conditions
/// translated to the backing service's type names.
fn backing_selections(
    blueprint: &Blueprint,
    instruction: &BatchHydrationInstruction,
    children: &[Field],
) -> Vec<Field> {
    let service = instruction.backing_service.as_str();
    let returns_object =
        blueprint.is_object_type(service, instruction.backing_field_def.field_type.inner_type_name());
    children
        .iter()
        .map(|child| translate_field(blueprint, service, child, returns_object))
        .collect()
}

fn translate_field(
    blueprint: &Blueprint,
    service: &str,
    field: &Field,
    unconditional: bool,
) -> Field {
    Field {
        alias: field.alias.clone(),
        name: field.name.clone(),
        arguments: field.arguments.clone(),
        enum_arguments: field.enum_arguments.clone(),
        object_types: if unconditional {
            Vec::new()
        } else {
            field
                .object_types
                .iter()
                .map(|object_type| blueprint.underlying_type_name(service, object_type).to_string())
                .collect()
        },
        children: field
            .children
            .iter()
            .map(|child| translate_field(blueprint, service, child, false))
            .collect(),
    }
}

#[async_trait]
impl Transform for BatchHydrationTransform {
    type State = BatchHydrationState;

    fn is_applicable(&self, context: &ExecutionContext, field: &Field) -> Option<Self::State> {
        let instructions: IndexMap<String, Vec<Arc<BatchHydrationInstruction>>> = field
            .object_types
            .iter()
            .filter_map(|object_type| {
                let found = context
                    .blueprint
                    .instructions_for_field(object_type, &field.name);
                (!found.is_empty()).then(|| (object_type.clone(), found.to_vec()))
            })
            .collect();
        if instructions.is_empty() {
            return None;
        }

        debug!(
            field = %field.name,
            object_types = ?instructions.keys().collect::<Vec<_>>(),
            "batch hydration applies"
        );
        Some(BatchHydrationState {
            field: field.clone(),
            aliases: AliasHelper::for_field(field),
            instructions,
        })
    }

    fn transform_field(
        &self,
        context: &ExecutionContext,
        state: &Self::State,
    ) -> Result<TransformFieldResult, HydrationError> {
        let mut artificial_fields = Vec::new();
        if state.needs_type_discriminator() {
            artificial_fields.push(
                Field::builder()
                    .alias(state.aliases.type_name_result_key())
                    .name("__typename")
                    .build(),
            );
        }

        for (object_type, instructions) in &state.instructions {
            let underlying = context
                .blueprint
                .underlying_type_name(&context.service_name, object_type)
                .to_string();
            for instruction in instructions {
                let batch_argument = instruction.batch_argument()?;
                let source_paths = std::iter::once(batch_argument.query_path).chain(
                    instruction
                        .match_strategy
                        .identifiers()
                        .iter()
                        .map(|identifier| identifier.source_id.as_slice()),
                );
                for path in source_paths {
                    if let Some(field) = state
                        .aliases
                        .artificial_field(path, std::slice::from_ref(&underlying))
                    {
                        Field::merge_into(&mut artificial_fields, field);
                    }
                }
            }
        }

        // types without an instruction still resolve the field themselves
        let remaining: Vec<String> = state
            .field
            .object_types
            .iter()
            .filter(|object_type| !state.instructions.contains_key(object_type.as_str()))
            .cloned()
            .collect();
        let new_field = (!remaining.is_empty()).then(|| Field {
            object_types: remaining,
            ..state.field.clone()
        });

        Ok(TransformFieldResult {
            new_field,
            artificial_fields,
        })
    }

    #[instrument(skip_all, level = "debug", name = "batch_hydration", fields(graphql.field = %state.field.result_key(), parents = parents.len()))]
    async fn get_result_instructions(
        &self,
        context: &ExecutionContext,
        state: &Self::State,
        parents: &[ParentNode<'_>],
    ) -> Result<HydrationResult, HydrationError> {
        let result_key = state.field.result_key();
        let mut result = HydrationResult::default();

        let mut groups: Vec<(Arc<BatchHydrationInstruction>, Vec<&ParentNode<'_>>)> = Vec::new();
        for parent in parents {
            let candidates = match self.candidates(context, state, parent) {
                Ok(Some(candidates)) => candidates,
                Ok(None) => continue,
                Err(error) => {
                    failfast_error!(%error, "batch hydration failed");
                    return Err(error);
                }
            };
            let chosen = match candidates {
                [only] => Some(only),
                _ => self
                    .picker
                    .pick(candidates, parent, &state.aliases)
                    .and_then(|index| candidates.get(index)),
            };
            match chosen {
                Some(instruction) => {
                    match groups
                        .iter_mut()
                        .find(|(grouped, _)| Arc::ptr_eq(grouped, instruction))
                    {
                        Some((_, members)) => members.push(parent),
                        None => groups.push((instruction.clone(), vec![parent])),
                    }
                }
                None => result.instructions.push(ResultInstruction::set(
                    parent.path.with_key(result_key),
                    Value::Null,
                )),
            }
        }

        let outcomes = join_all(
            groups
                .iter()
                .map(|(instruction, members)| self.hydrate(context, state, instruction, members)),
        )
        .await;
        for outcome in outcomes {
            match outcome {
                Ok(hydrated) => result.extend(hydrated),
                Err(error) => {
                    failfast_error!(%error, "batch hydration failed");
                    return Err(error);
                }
            }
        }

        debug!(
            instructions = result.instructions.len(),
            errors = result.errors.len(),
            "batch hydration done"
        );
        Ok(result)
    }
}
