use std::sync::Arc;

use super::arguments::source_inputs;
use super::ParentNode;
use crate::blueprint::BatchHydrationInstruction;
use crate::json_ext::Path;
use crate::query::AliasHelper;

/// Chooses which instruction hydrates a parent node when several are
/// declared for its type.
///
/// Returns the index of the chosen candidate, or `None` when none applies,
/// in which case the hydrated field is set to `null`.
pub trait InstructionPicker: Send + Sync {
    fn pick(
        &self,
        candidates: &[Arc<BatchHydrationInstruction>],
        parent: &ParentNode<'_>,
        aliases: &AliasHelper,
    ) -> Option<usize>;
}

/// Picks the first candidate whose batch input is present on the parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInstructionPicker;

impl InstructionPicker for DefaultInstructionPicker {
    fn pick(
        &self,
        candidates: &[Arc<BatchHydrationInstruction>],
        parent: &ParentNode<'_>,
        aliases: &AliasHelper,
    ) -> Option<usize> {
        candidates.iter().position(|candidate| {
            candidate.batch_argument().is_ok_and(|argument| {
                let path = Path::from_slice(&aliases.query_path(argument.query_path));
                !source_inputs(parent.value, &path, true).is_empty()
            })
        })
    }
}

struct PickerFn<F>(F);

impl<F> InstructionPicker for PickerFn<F>
where
    F: Fn(&[Arc<BatchHydrationInstruction>], &ParentNode<'_>, &AliasHelper) -> Option<usize>
        + Send
        + Sync,
{
    fn pick(
        &self,
        candidates: &[Arc<BatchHydrationInstruction>],
        parent: &ParentNode<'_>,
        aliases: &AliasHelper,
    ) -> Option<usize> {
        (self.0)(candidates, parent, aliases)
    }
}

/// Build an [`InstructionPicker`] from a closure.
pub fn picker_fn<F>(f: F) -> Arc<dyn InstructionPicker>
where
    F: Fn(&[Arc<BatchHydrationInstruction>], &ParentNode<'_>, &AliasHelper) -> Option<usize>
        + Send
        + Sync
        + 'static,
{
    Arc::new(PickerFn(f))
}
