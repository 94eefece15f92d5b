use super::Field;

const ALIAS_PREFIX: &str = "batch_hydration";

/// Aliases for the selections hydration adds to outgoing queries.
///
/// Aliases are derived from the hydrated field's result key so that two
/// hydrated fields on the same parent never collide, and so that the added
/// selections can be told apart from what the client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasHelper {
    base: String,
}

impl AliasHelper {
    pub fn for_field(field: &Field) -> Self {
        Self {
            base: format!("{ALIAS_PREFIX}__{}", field.result_key()),
        }
    }

    /// `batch_hydration__<resultKey>__<name>`
    pub fn artificial_key(&self, name: &str) -> String {
        format!("{}__{name}", self.base)
    }

    /// The key of the injected `__typename` selection.
    pub fn type_name_result_key(&self) -> String {
        format!("typename__{}", self.base)
    }

    /// A query path whose first segment is aliased. The rest of the path
    /// lives under that aliased field and keeps its names.
    pub fn query_path(&self, path: &[String]) -> Vec<String> {
        path.iter()
            .enumerate()
            .map(|(index, segment)| {
                if index == 0 {
                    self.artificial_key(segment)
                } else {
                    segment.clone()
                }
            })
            .collect()
    }

    /// Select `path` on the parent with its first segment aliased.
    pub fn artificial_field(&self, path: &[String], object_types: &[String]) -> Option<Field> {
        let mut field = Field::from_query_path(path, Vec::new())?;
        field.alias = path.first().map(|first| self.artificial_key(first));
        field.object_types = object_types.to_vec();
        Some(field)
    }
}
