//! Batch hydration.
//!
//! A hydrated field is removed from the query sent to the service owning its
//! parent, and the values it needs are selected in its place under
//! artificial aliases. Once that service answers, the inputs of every parent
//! node are gathered, sent to the backing service in batches, and the
//! resolved objects are matched back to their parent nodes either by position
//! ([`MatchStrategy::MatchIndex`]) or by object identifier.
//!
//! [`MatchStrategy::MatchIndex`]: crate::blueprint::MatchStrategy::MatchIndex

use crate::error::FetchError;
use crate::graphql;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

mod arguments;
mod dispatch;
mod identifiers;
mod index;
mod object_id;
mod picker;
mod transform;

pub use picker::picker_fn;
pub use picker::DefaultInstructionPicker;
pub use picker::InstructionPicker;
pub use transform::BatchHydrationState;
pub use transform::BatchHydrationTransform;
pub use transform::ExecutionContext;
pub use transform::Transform;
pub use transform::TransformFieldResult;

/// A node of the owning service's result that carries a hydrated field.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentNode<'a> {
    pub path: Path,
    pub value: &'a Value,
}

impl<'a> ParentNode<'a> {
    /// Every object found at `path` in `data`, lists flattened.
    ///
    /// `null` parents have nothing to hydrate and are skipped.
    pub fn select(data: &'a Value, path: &Path) -> Vec<ParentNode<'a>> {
        data.nodes_at(path, true)
            .into_iter()
            .filter(|(_, value)| value.is_object())
            .map(|(path, value)| ParentNode { path, value })
            .collect()
    }
}

/// A mutation of the result tree produced by hydration.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ResultInstruction {
    /// Set `value` at `path`, replacing whatever is there.
    Set { path: Path, value: Value },
}

impl ResultInstruction {
    pub fn set(path: Path, value: Value) -> Self {
        ResultInstruction::Set { path, value }
    }

    pub fn path(&self) -> &Path {
        match self {
            ResultInstruction::Set { path, .. } => path,
        }
    }

    /// Apply the instruction to a result tree.
    pub fn apply(self, data: &mut Value) -> Result<(), FetchError> {
        match self {
            ResultInstruction::Set { path, value } => data.insert(&path, value),
        }
    }
}

/// What hydrating one field produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationResult {
    pub instructions: Vec<ResultInstruction>,
    /// Errors returned by backing services, attached to the hydrated field.
    pub errors: Vec<graphql::Error>,
}

impl HydrationResult {
    pub(crate) fn extend(&mut self, other: HydrationResult) {
        self.instructions.extend(other.instructions);
        self.errors.extend(other.errors);
    }

    /// Apply every instruction to `data`.
    pub fn apply(self, data: &mut Value) -> Result<Vec<graphql::Error>, FetchError> {
        for instruction in self.instructions {
            instruction.apply(data)?;
        }
        Ok(self.errors)
    }
}
