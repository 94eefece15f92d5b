use super::arguments::is_absent;
use super::arguments::source_inputs;
use super::dispatch::ResolvedObjectBatch;
use super::ParentNode;
use super::ResultInstruction;
use crate::blueprint::BatchArgument;
use crate::blueprint::BatchHydrationInstruction;
use crate::error::HydrationError;
use crate::json_ext::Path;
use crate::json_ext::Value;

static NULL: Value = Value::Null;

/// A cursor over the resolved values of every batch, in dispatch order.
///
/// It only moves forward: the n-th value read belongs to the n-th non-null
/// input that was batched.
struct IndexCursor<'a> {
    field: String,
    values: Vec<&'a Value>,
    position: usize,
}

impl<'a> IndexCursor<'a> {
    /// Concatenate the backing field values of every batch.
    ///
    /// Every batch but the last must return exactly one value per input. A
    /// batch without data stands for one `null` per input.
    fn new(
        instruction: &BatchHydrationInstruction,
        resolved: &'a [ResolvedObjectBatch],
        batch_size: usize,
    ) -> Result<Self, HydrationError> {
        let field = instruction.location.to_string();
        let mut values = Vec::new();
        for (index, batch) in resolved.iter().enumerate() {
            match batch.backing_value(instruction) {
                Some(Value::Array(items)) => {
                    let is_last = index + 1 == resolved.len();
                    if !is_last && items.len() != batch_size {
                        return Err(HydrationError::IndexedCountMismatch {
                            field,
                            expected: batch_size,
                            actual: items.len(),
                        });
                    }
                    values.extend(items.iter());
                }
                None | Some(Value::Null) => {
                    values.extend(std::iter::repeat(&NULL).take(batch.source_inputs.len()));
                }
                Some(_) => return Err(HydrationError::ExpectedListResult { field }),
            }
        }
        Ok(Self {
            field,
            values,
            position: 0,
        })
    }

    fn next(&mut self) -> Result<Value, HydrationError> {
        let value = self
            .values
            .get(self.position)
            .map(|value| (*value).clone())
            .ok_or_else(|| HydrationError::IndexedResultsExhausted {
                field: self.field.clone(),
                position: self.position,
            })?;
        self.position += 1;
        Ok(value)
    }
}

/// Match resolved values to parent nodes by position.
///
/// Parents are walked in the order their inputs were batched. When the batch
/// argument is a list, each parent receives one value per input, `null`
/// inputs giving `null` without consuming a value. Otherwise each parent
/// receives the single value for its single input.
pub(super) fn match_by_index(
    instruction: &BatchHydrationInstruction,
    batch_argument: BatchArgument<'_>,
    result_key: &str,
    parents: &[&ParentNode<'_>],
    input_path: &Path,
    resolved: &[ResolvedObjectBatch],
    batch_size: usize,
) -> Result<Vec<ResultInstruction>, HydrationError> {
    let mut cursor = IndexCursor::new(instruction, resolved, batch_size)?;
    let fan_out = batch_argument.field_type.is_list();

    let mut instructions = Vec::with_capacity(parents.len());
    for parent in parents {
        let path = parent.path.with_key(result_key);
        if is_absent(parent.value, input_path) {
            instructions.push(ResultInstruction::set(path, Value::Null));
            continue;
        }

        let inputs = source_inputs(parent.value, input_path, false);
        let value = if fan_out {
            let mut values = Vec::with_capacity(inputs.len());
            for input in inputs {
                values.push(if input.is_null() {
                    Value::Null
                } else {
                    cursor.next()?
                });
            }
            Value::Array(values)
        } else {
            match inputs.as_slice() {
                [] => Value::Null,
                [input] if input.is_null() => Value::Null,
                [_] => cursor.next()?,
                _ => {
                    return Err(HydrationError::ExpectedSingleSourceId {
                        field: instruction.location.to_string(),
                        count: inputs.len(),
                    })
                }
            }
        };
        instructions.push(ResultInstruction::set(path, value));
    }

    Ok(instructions)
}
