use crate::blueprint::BatchHydrationInstruction;
use crate::blueprint::Blueprint;
use crate::error::HydrationError;
use crate::query::AliasHelper;
use crate::query::Field;

/// Selections added to the backing query so that resolved objects can be
/// matched back by identifier.
///
/// Each identifier's result field is selected under an alias, on every
/// concrete object type the backing field may return.
pub(super) fn identifier_fields(
    blueprint: &Blueprint,
    instruction: &BatchHydrationInstruction,
    aliases: &AliasHelper,
) -> Result<Vec<Field>, HydrationError> {
    let identifiers = instruction.match_strategy.identifiers();
    if identifiers.is_empty() {
        return Ok(Vec::new());
    }

    let service = instruction.backing_service.as_str();
    let type_name = instruction.backing_field_def.field_type.inner_type_name();
    let object_types = blueprint.object_types_of(service, type_name);
    if object_types.is_empty() {
        return Err(HydrationError::UnresolvedObjectIdentifierType {
            service: service.to_string(),
            type_name: type_name.to_string(),
        });
    }
    // no type condition needed when the backing field returns an object type
    let object_types = if blueprint.is_object_type(service, type_name) {
        Vec::new()
    } else {
        object_types
    };

    let mut fields = Vec::with_capacity(identifiers.len());
    for identifier in identifiers {
        Field::merge_into(
            &mut fields,
            Field::builder()
                .alias(aliases.artificial_key(&identifier.result_id))
                .name(identifier.result_id.clone())
                .object_types(object_types.clone())
                .build(),
        );
    }
    Ok(fields)
}
