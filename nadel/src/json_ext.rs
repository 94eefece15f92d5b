//! Performance oriented JSON manipulation.

use std::fmt;

use serde::de;
use serde::de::Visitor;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

use crate::error::FetchError;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

const FLATTEN_CHARACTER: &str = "@";

/// Extension trait for [`serde_json_bytes::Value`].
pub trait ValueExt {
    /// Get a reference to the value at a particular path.
    ///
    /// Returns `None` when a key is missing, an index is out of bounds, or the
    /// path contains a flatten element.
    #[track_caller]
    fn get_path(&self, path: &Path) -> Option<&Value>;

    /// Select every node found at `path`, along with its concrete path.
    ///
    /// With `flatten` set, every list met while walking the path (the final
    /// value included) is expanded into its elements, recursively for nested
    /// lists. Missing keys and `null` intermediate values yield no node; a
    /// `null` final value yields a `null` node.
    #[track_caller]
    fn nodes_at<'a>(&'a self, path: &Path, flatten: bool) -> Vec<(Path, &'a Value)>;

    /// Insert a `value` at a `Path`, creating intermediate objects and
    /// padding arrays with `null` as needed.
    #[track_caller]
    fn insert(&mut self, path: &Path, value: Value) -> Result<(), FetchError>;
}

impl ValueExt for Value {
    fn get_path(&self, path: &Path) -> Option<&Value> {
        let mut current = self;
        for element in path.iter() {
            current = match (element, current) {
                (PathElement::Key(key), Value::Object(object)) => object.get(key.as_str())?,
                (PathElement::Index(index), Value::Array(array)) => array.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    fn nodes_at<'a>(&'a self, path: &Path, flatten: bool) -> Vec<(Path, &'a Value)> {
        let mut nodes = Vec::new();
        collect_nodes(self, &path.0, Path::empty(), flatten, &mut nodes);
        nodes
    }

    fn insert(&mut self, path: &Path, value: Value) -> Result<(), FetchError> {
        let mut current = self;
        for element in path.iter() {
            match element {
                PathElement::Key(key) => {
                    if current.is_null() {
                        *current = Value::Object(Object::new());
                    }
                    match current {
                        Value::Object(object) => {
                            current = object.entry(key.as_str()).or_insert(Value::Null);
                        }
                        _ => {
                            return Err(FetchError::ExecutionPathNotFound {
                                reason: format!("expected an object for key '{key}' in {path}"),
                            })
                        }
                    }
                }
                PathElement::Index(index) => {
                    if current.is_null() {
                        *current = Value::Array(Vec::new());
                    }
                    match current {
                        Value::Array(array) => {
                            if array.len() <= *index {
                                array.resize(*index + 1, Value::Null);
                            }
                            current = &mut array[*index];
                        }
                        _ => {
                            return Err(FetchError::ExecutionPathNotFound {
                                reason: format!("expected an array for index {index} in {path}"),
                            })
                        }
                    }
                }
                PathElement::Flatten => {
                    return Err(FetchError::ExecutionPathNotFound {
                        reason: format!("cannot insert at a flattened path: {path}"),
                    })
                }
            }
        }
        *current = value;
        Ok(())
    }
}

fn collect_nodes<'a>(
    value: &'a Value,
    remaining: &[PathElement],
    current: Path,
    flatten: bool,
    nodes: &mut Vec<(Path, &'a Value)>,
) {
    match (remaining.split_first(), value) {
        (Some((PathElement::Index(index), rest)), Value::Array(array)) => {
            if let Some(item) = array.get(*index) {
                collect_nodes(item, rest, current.with_index(*index), flatten, nodes);
            }
        }
        (Some((PathElement::Flatten, rest)), Value::Array(array)) => {
            for (index, item) in array.iter().enumerate() {
                collect_nodes(item, rest, current.with_index(index), flatten, nodes);
            }
        }
        (_, Value::Array(array)) if flatten => {
            for (index, item) in array.iter().enumerate() {
                collect_nodes(item, remaining, current.with_index(index), flatten, nodes);
            }
        }
        (None, _) => nodes.push((current, value)),
        (Some((PathElement::Key(key), rest)), Value::Object(object)) => {
            if let Some(child) = object.get(key.as_str()) {
                collect_nodes(child, rest, current.with_key(key), flatten, nodes);
            }
        }
        _ => {}
    }
}

/// A GraphQL path element that is composed of strings or numbers.
/// e.g `/book/3/name`
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PathElement {
    /// A path element that given an array will flatmap the content.
    Flatten,

    /// An index path element.
    Index(usize),

    /// A key path element.
    Key(String),
}

impl Serialize for PathElement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PathElement::Flatten => serializer.serialize_str(FLATTEN_CHARACTER),
            PathElement::Index(index) => serializer.serialize_u64(*index as u64),
            PathElement::Key(key) => serializer.serialize_str(key),
        }
    }
}

impl<'de> Deserialize<'de> for PathElement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PathElementVisitor)
    }
}

struct PathElementVisitor;

impl<'de> Visitor<'de> for PathElementVisitor {
    type Value = PathElement;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string or a non negative integer")
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        usize::try_from(value)
            .map(PathElement::Index)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(value), &self))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        usize::try_from(value)
            .map(PathElement::Index)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(parse_path_element(value))
    }
}

fn parse_path_element(element: &str) -> PathElement {
    if element == FLATTEN_CHARACTER {
        PathElement::Flatten
    } else if let Ok(index) = element.parse::<usize>() {
        PathElement::Index(index)
    } else {
        PathElement::Key(element.to_string())
    }
}

/// A path into the result document.
///
/// This can be composed of strings and numbers
#[derive(Clone, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Default::default())
    }

    /// Build a path made only of keys.
    pub fn from_slice<T: AsRef<str>>(keys: &[T]) -> Self {
        Self(
            keys.iter()
                .map(|key| PathElement::Key(key.as_ref().to_string()))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, element: PathElement) {
        self.0.push(element)
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    pub fn with_key(&self, key: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.push(PathElement::Key(key.into()));
        new
    }

    pub fn with_index(&self, index: usize) -> Self {
        let mut new = self.clone();
        new.push(PathElement::Index(index));
        new
    }

    /// The same path with list positions removed, keeping only keys.
    pub fn keys_only(&self) -> Self {
        Path(
            self.iter()
                .filter(|element| matches!(element, PathElement::Key(_)))
                .cloned()
                .collect(),
        )
    }
}

impl<T> From<T> for Path
where
    T: AsRef<str>,
{
    fn from(s: T) -> Self {
        Self(
            s.as_ref()
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(parse_path_element)
                .collect(),
        )
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/")?;
            match element {
                PathElement::Index(index) => write!(f, "{index}")?,
                PathElement::Key(key) => write!(f, "{key}")?,
                PathElement::Flatten => write!(f, "{FLATTEN_CHARACTER}")?,
            }
        }
        Ok(())
    }
}
