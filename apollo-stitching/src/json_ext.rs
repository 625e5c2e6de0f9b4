//! JSON paths and helpers over [`serde_json_bytes`] values.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// One segment of a [`Path`]: a response key or a list index.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index into a JSON array.
    Index(usize),

    /// A key in a JSON object.
    Key(String),
}

impl PathElement {
    /// Returns the key if this element is one.
    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathElement::Key(key) => Some(key),
            PathElement::Index(_) => None,
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Key(key) => f.write_str(key),
        }
    }
}

impl From<&str> for PathElement {
    fn from(key: &str) -> Self {
        PathElement::Key(key.to_string())
    }
}

impl From<String> for PathElement {
    fn from(key: String) -> Self {
        PathElement::Key(key)
    }
}

impl From<usize> for PathElement {
    fn from(index: usize) -> Self {
        PathElement::Index(index)
    }
}

/// A path into a GraphQL response, as found in `errors[].path`.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    /// The path without its last element; `None` for the empty path.
    pub fn parent(&self) -> Option<Path> {
        let (_, parent) = self.0.split_last()?;
        Some(Path(parent.to_vec()))
    }

    /// Concatenates two paths into a new one.
    pub fn join(&self, other: impl AsRef<Path>) -> Path {
        let other = other.as_ref();
        let mut elements = Vec::with_capacity(self.len() + other.len());
        elements.extend_from_slice(&self.0);
        elements.extend_from_slice(&other.0);
        Path(elements)
    }

    pub fn push_key(&mut self, key: impl Into<String>) {
        self.0.push(PathElement::Key(key.into()))
    }

    /// Returns a copy of this path with one more key.
    pub fn with_key(&self, key: impl Into<String>) -> Path {
        let mut path = self.clone();
        path.push_key(key);
        path
    }

    /// Whether `prefix` is equal to this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns the remainder of this path below `prefix`.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        self.0
            .strip_prefix(prefix.0.as_slice())
            .map(|rest| Path(rest.to_vec()))
    }
}

impl AsRef<Path> for Path {
    fn as_ref(&self) -> &Path {
        self
    }
}

impl<T> FromIterator<T> for Path
where
    T: Into<PathElement>,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Path(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<PathElement>> for Path {
    fn from(elements: Vec<PathElement>) -> Self {
        Path(elements)
    }
}

/// Formats as `/a/1/b`, the empty path as `/`.
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("/");
        }
        for element in self.iter() {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}

/// Builds a [`Path`] from keys and indexes: `path!["getOuter", "innerList", 1]`.
#[macro_export]
macro_rules! path {
    ($($element:expr),* $(,)?) => {
        $crate::json_ext::Path(vec![$($crate::json_ext::PathElement::from($element)),*])
    };
}

pub trait ValueExt {
    /// Returns the value found by walking `path`, or `None` when a segment does not match.
    fn get_path(&self, path: &Path) -> Option<&Value>;
}

impl ValueExt for Value {
    fn get_path(&self, path: &Path) -> Option<&Value> {
        path.iter().try_fold(self, |current, element| match element {
            PathElement::Key(key) => current.as_object()?.get(key.as_str()),
            PathElement::Index(index) => current.as_array()?.get(*index),
        })
    }
}
