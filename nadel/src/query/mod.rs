//! Executable query fields, as sent to services.

use std::fmt;

use apollo_compiler::ast;
use apollo_compiler::InvalidNameError;
use apollo_compiler::Name;
use apollo_compiler::Node;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;

use crate::json_ext::Object;
use crate::json_ext::Value;

mod alias;

pub use alias::AliasHelper;

/// A field selection.
///
/// `object_types` restricts the selection to parents of those concrete
/// types. An empty list selects the field unconditionally.
///
/// String values of the arguments named in `enum_arguments` are sent as
/// enum values rather than string literals.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Object,
    pub enum_arguments: Vec<String>,
    pub object_types: Vec<String>,
    pub children: Vec<Field>,
}

#[buildstructor::buildstructor]
impl Field {
    #[builder(visibility = "pub")]
    fn new(
        alias: Option<String>,
        name: String,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        arguments: JsonMap<ByteString, Value>,
        enum_arguments: Vec<String>,
        object_types: Vec<String>,
        children: Vec<Field>,
    ) -> Self {
        Self {
            alias,
            name,
            arguments,
            enum_arguments,
            object_types,
            children,
        }
    }

    /// The key this field answers under in the response.
    pub fn result_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.name.as_str())
    }

    /// Build `first { second { ... { last } } }` from a query path, with
    /// `leaf_children` selected on the last segment.
    pub fn from_query_path(path: &[String], leaf_children: Vec<Field>) -> Option<Field> {
        let (last, parents) = path.split_last()?;
        let mut field = Field {
            name: last.clone(),
            children: leaf_children,
            ..Default::default()
        };
        for name in parents.iter().rev() {
            field = Field {
                name: name.clone(),
                children: vec![field],
                ..Default::default()
            };
        }
        Some(field)
    }

    /// Add `field` to `fields`, merging it into an existing selection that
    /// answers under the same key for the same types.
    pub fn merge_into(fields: &mut Vec<Field>, field: Field) {
        match fields.iter_mut().find(|existing| {
            existing.result_key() == field.result_key()
                && existing.name == field.name
                && existing.arguments == field.arguments
                && existing.enum_arguments == field.enum_arguments
                && existing.object_types == field.object_types
        }) {
            Some(existing) => {
                for child in field.children {
                    Field::merge_into(&mut existing.children, child);
                }
            }
            None => fields.push(field),
        }
    }

    /// The field as a GraphQL AST node, ignoring its own type condition.
    pub fn to_ast(&self) -> Result<ast::Field, InvalidNameError> {
        let arguments = self
            .arguments
            .iter()
            .map(|(name, value)| {
                let as_enum = self
                    .enum_arguments
                    .iter()
                    .any(|enum_argument| enum_argument.as_str() == name.as_str());
                Ok(Node::new(ast::Argument {
                    name: Name::new(name.as_str())?,
                    value: Node::new(to_ast_value(value, as_enum)?),
                }))
            })
            .collect::<Result<Vec<_>, InvalidNameError>>()?;

        Ok(ast::Field {
            alias: self.alias.as_deref().map(Name::new).transpose()?,
            name: Name::new(self.name.as_str())?,
            arguments,
            directives: ast::DirectiveList(vec![]),
            selection_set: selection_set(&self.children)?,
        })
    }
}

/// Unconditional fields first, then one inline fragment per type condition
/// in order of first appearance.
fn selection_set(fields: &[Field]) -> Result<Vec<ast::Selection>, InvalidNameError> {
    let mut selections = fields
        .iter()
        .filter(|field| field.object_types.is_empty())
        .map(|field| Ok(ast::Selection::Field(Node::new(field.to_ast()?))))
        .collect::<Result<Vec<_>, InvalidNameError>>()?;

    let mut type_conditions: Vec<&str> = Vec::new();
    for field in fields {
        for object_type in &field.object_types {
            if !type_conditions.contains(&object_type.as_str()) {
                type_conditions.push(object_type);
            }
        }
    }
    for type_condition in type_conditions {
        let selection_set = fields
            .iter()
            .filter(|field| field.object_types.iter().any(|t| t == type_condition))
            .map(|field| Ok(ast::Selection::Field(Node::new(field.to_ast()?))))
            .collect::<Result<Vec<_>, InvalidNameError>>()?;
        selections.push(ast::Selection::InlineFragment(Node::new(
            ast::InlineFragment {
                type_condition: Some(Name::new(type_condition)?),
                directives: ast::DirectiveList(vec![]),
                selection_set,
            },
        )));
    }
    Ok(selections)
}

fn to_ast_value(value: &Value, as_enum: bool) -> Result<ast::Value, InvalidNameError> {
    Ok(match value {
        Value::Null => ast::Value::Null,
        Value::Bool(b) => ast::Value::Boolean(*b),
        Value::Number(number) => {
            if let Some(int) = number.as_i64().and_then(|int| i32::try_from(int).ok()) {
                ast::Value::Int(int.into())
            } else if let (true, Some(float)) = (number.is_f64(), number.as_f64()) {
                ast::Value::Float(float.into())
            } else {
                ast::Value::Int(ast::IntValue::new_parsed(&number.to_string()))
            }
        }
        Value::String(s) if as_enum => ast::Value::Enum(Name::new(s.as_str())?),
        Value::String(s) => ast::Value::String(s.as_str().to_string()),
        Value::Array(items) => ast::Value::List(
            items
                .iter()
                .map(|item| to_ast_value(item, as_enum).map(Node::new))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(object) => ast::Value::Object(
            object
                .iter()
                .map(|(key, item)| {
                    Ok((Name::new(key.as_str())?, Node::new(to_ast_value(item, false)?)))
                })
                .collect::<Result<_, InvalidNameError>>()?,
        ),
    })
}

/// Prints the field with its sub-selection, ignoring its own type condition.
impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(field) = self.to_ast() else {
            return Err(fmt::Error);
        };
        write!(f, "{}", field.serialize().no_indent())
    }
}

/// A `query` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: Option<String>,
    pub selections: Vec<Field>,
}

impl Operation {
    pub fn to_ast(&self) -> Result<ast::OperationDefinition, InvalidNameError> {
        Ok(ast::OperationDefinition {
            operation_type: ast::OperationType::Query,
            name: self.name.as_deref().map(Name::new).transpose()?,
            variables: Vec::new(),
            directives: ast::DirectiveList(vec![]),
            selection_set: selection_set(&self.selections)?,
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(operation) = self.to_ast() else {
            return Err(fmt::Error);
        };
        write!(f, "{}", operation.serialize().no_indent())
    }
}
