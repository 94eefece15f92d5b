use tracing::debug;

use super::ParentNode;
use crate::blueprint::BatchArgument;
use crate::blueprint::BatchHydrationInstruction;
use crate::blueprint::ValueSource;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// The arguments of one call to the backing field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArgumentBatch {
    /// The inputs carried by the batch argument, in order.
    pub(crate) source_inputs: Vec<Value>,
    pub(crate) arguments: Object,
}

/// The values found at `path` under a parent, nested lists flattened.
///
/// With `filter_null` unset, `null` values are kept so that positions line up
/// with what was batched.
pub(super) fn source_inputs<'a>(parent: &'a Value, path: &Path, filter_null: bool) -> Vec<&'a Value> {
    parent
        .nodes_at(path, true)
        .into_iter()
        .map(|(_, value)| value)
        .filter(|value| !(filter_null && value.is_null()))
        .collect()
}

/// Whether the parent carries no input at all: the field selected at the
/// first segment of `path` is missing or `null`.
pub(super) fn is_absent(parent: &Value, path: &Path) -> bool {
    match path.iter().next() {
        Some(first @ PathElement::Key(_)) => parent
            .get_path(&Path(vec![first.clone()]))
            .map_or(true, Value::is_null),
        _ => parent.is_null(),
    }
}

/// Split the inputs of `parents` into argument sets of at most `batch_size`
/// inputs each.
///
/// Inputs are read at `input_path`, the aliased path of the batch argument.
/// Chunks follow parent order, then input order within a parent.
pub(super) fn build_batches(
    instruction: &BatchHydrationInstruction,
    batch_argument: BatchArgument<'_>,
    field_arguments: &Object,
    parents: &[&ParentNode<'_>],
    input_path: &Path,
    batch_size: usize,
) -> Vec<ArgumentBatch> {
    let template = resolve_arguments(instruction, field_arguments);

    let inputs: Vec<Value> = parents
        .iter()
        .flat_map(|parent| source_inputs(parent.value, input_path, true))
        .cloned()
        .collect();

    let batches: Vec<ArgumentBatch> = inputs
        .chunks(batch_size.max(1))
        .map(|chunk| {
            let mut arguments = Object::new();
            for (name, value) in &template {
                match value {
                    Some(value) => {
                        arguments.insert(name.as_str(), value.clone());
                    }
                    None if name.as_str() == batch_argument.name => {
                        arguments.insert(name.as_str(), Value::Array(chunk.to_vec()));
                    }
                    None => {}
                }
            }
            ArgumentBatch {
                source_inputs: chunk.to_vec(),
                arguments,
            }
        })
        .collect();

    debug!(
        field = %instruction.location,
        inputs = inputs.len(),
        batches = batches.len(),
        batch_size,
        "built batch hydration arguments"
    );
    batches
}

/// Resolve every argument but the batched one, in declaration order.
///
/// The batch argument keeps its slot with no value so that it is sent in
/// the declared position.
fn resolve_arguments(
    instruction: &BatchHydrationInstruction,
    field_arguments: &Object,
) -> Vec<(String, Option<Value>)> {
    let mut resolved = Vec::with_capacity(instruction.source_arguments.len());
    for argument in &instruction.source_arguments {
        let value = match &argument.value_source {
            ValueSource::FieldResultValue { .. } => {
                resolved.push((argument.name.clone(), None));
                continue;
            }
            ValueSource::ArgumentValue {
                argument_name,
                default_value,
            } => field_arguments
                .get(argument_name.as_str())
                .cloned()
                .or_else(|| default_value.clone()),
            ValueSource::StaticValue { value } => Some(value.clone()),
            ValueSource::RemainingArguments { argument_names } => {
                let remaining: Object = argument_names
                    .iter()
                    .filter_map(|name| {
                        field_arguments
                            .get(name.as_str())
                            .map(|value| (name.as_str().into(), value.clone()))
                    })
                    .collect();
                (!remaining.is_empty()).then_some(Value::Object(remaining))
            }
        };
        if let Some(value) = value {
            resolved.push((argument.name.clone(), Some(value)));
        }
    }
    resolved
}
