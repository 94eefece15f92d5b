use std::fmt;
use std::str::FromStr;

use apollo_compiler::ast;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// could not parse type reference '{0}'
#[derive(Debug, Clone, PartialEq, Eq, displaydoc::Display, thiserror::Error)]
pub struct InvalidFieldType(String);

/// A GraphQL type reference, written the way it appears in SDL: `[ID!]!`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(try_from = "String", into = "String")]
pub struct FieldType(#[schemars(with = "String")] ast::Type);

impl FieldType {
    /// Whether the type is a list once a non-null wrapper is looked through.
    pub fn is_list(&self) -> bool {
        self.0.is_list()
    }

    /// The named type at the bottom of any list and non-null wrappers.
    pub fn inner_type_name(&self) -> &str {
        self.0.inner_named_type().as_str()
    }

    pub fn as_ast(&self) -> &ast::Type {
        &self.0
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<ast::Type> for FieldType {
    fn from(ty: ast::Type) -> Self {
        FieldType(ty)
    }
}

impl FromStr for FieldType {
    type Err = InvalidFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ast::Type::parse(s, "field_type.graphql")
            .map(FieldType)
            .map_err(|_| InvalidFieldType(s.to_string()))
    }
}

impl TryFrom<String> for FieldType {
    type Error = InvalidFieldType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.to_string()
    }
}
