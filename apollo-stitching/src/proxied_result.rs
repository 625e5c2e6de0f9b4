//! The result of a delegated call, as seen from the merged response.

use std::sync::Arc;

use crate::graphql::Error;
use crate::graphql::Response;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::relocate::relocated_error;

/// Identifies one error of one delegated response.
pub(crate) type ErrorId = (usize, usize);

/// A delegated response (data and errors) positioned at one point of its data tree.
///
/// Cloning and extracting sub-results is cheap: every extracted result shares the same frozen
/// response. Errors are kept with the path the subschema reported, and are only relocated into
/// the merged response when surfaced.
#[derive(Clone, Debug)]
pub struct ProxiedResult {
    response: Arc<Frozen>,
    cursor: Path,
}

#[derive(Debug)]
struct Frozen {
    /// `None` when the delegated call produced no data at all.
    data: Option<Value>,
    errors: Vec<(Path, Error)>,
    /// Where the root of `data` sits in the merged response.
    outer_prefix: Path,
}

impl ProxiedResult {
    /// Wraps a delegated response whose data root corresponds to `outer_prefix` in the merged
    /// response.
    pub fn new(response: Response, outer_prefix: Path) -> Self {
        let errors = response
            .errors
            .into_iter()
            .map(|error| (error.path.clone().unwrap_or_default(), error))
            .collect();
        Self {
            response: Arc::new(Frozen {
                data: response.data,
                errors,
                outer_prefix,
            }),
            cursor: Path::empty(),
        }
    }

    /// A result holding a plain value located at `outer_path`, without errors.
    pub fn from_value(value: Value, outer_path: Path) -> Self {
        Self::new(Response::builder().data(value).build(), outer_path)
    }

    /// A failed result: no data and a single error without a path.
    pub fn from_error(error: Error, outer_prefix: Path) -> Self {
        Self::new(Response::from_errors(vec![error]), outer_prefix)
    }

    /// The value at this position; `None` if it is absent from the data tree.
    pub fn data(&self) -> Option<&Value> {
        self.response
            .data
            .as_ref()
            .and_then(|data| data.get_path(&self.cursor))
    }

    /// Whether the value at this position is null or absent.
    pub fn is_null(&self) -> bool {
        self.data().is_none_or(Value::is_null)
    }

    /// The path of this position in the merged response.
    pub fn outer_path(&self) -> Path {
        self.response.outer_prefix.join(&self.cursor)
    }

    /// Every error of the delegated response, in order, with the path it was reported at.
    pub fn all_errors(&self) -> impl Iterator<Item = &(Path, Error)> {
        self.response.errors.iter()
    }

    pub fn has_errors(&self) -> bool {
        !self.response.errors.is_empty()
    }

    /// The sub-result at `path` below this position.
    ///
    /// Never modifies this result: the returned one shares the same data and errors.
    pub fn extract_subtree(&self, path: &Path) -> ProxiedResult {
        Self {
            response: self.response.clone(),
            cursor: self.cursor.join(path),
        }
    }

    pub(crate) fn extract_key(&self, key: &str) -> ProxiedResult {
        self.extract_subtree(&Path(vec![PathElement::Key(key.to_string())]))
    }

    pub(crate) fn extract_index(&self, index: usize) -> ProxiedResult {
        self.extract_subtree(&Path(vec![PathElement::Index(index)]))
    }

    /// Errors that apply to the value at `path` below this position.
    ///
    /// That is errors reported at that exact path or at any of its ancestors, the latter
    /// having nullified the whole subtree, plus errors reported without a path.
    pub fn errors_at_or_below(&self, path: &Path) -> Vec<&Error> {
        let target = self.cursor.join(path);
        self.response
            .errors
            .iter()
            .filter(|(error_path, _)| target.starts_with(error_path))
            .map(|(_, error)| error)
            .collect()
    }

    /// Errors reported strictly below `path`, relative to this position.
    pub fn errors_under(&self, path: &Path) -> Vec<&Error> {
        let target = self.cursor.join(path);
        self.response
            .errors
            .iter()
            .filter(|(error_path, _)| {
                error_path.len() > target.len() && error_path.starts_with(&target)
            })
            .map(|(_, error)| error)
            .collect()
    }

    /// Every error relevant to this position, in reported order, relocated into the merged
    /// response.
    ///
    /// Errors with a path keep it, prefixed with where the delegated data sits; errors without
    /// one are located here.
    pub fn surfaced_errors(&self) -> Vec<Error> {
        self.relevant_errors()
            .map(|(error_path, error)| self.relocate(error_path, error))
            .collect()
    }

    /// Errors at, above or below this position, with their reported paths.
    pub(crate) fn relevant_errors(&self) -> impl Iterator<Item = (&Path, &Error)> {
        self.response
            .errors
            .iter()
            .filter(|(error_path, _)| self.is_relevant(error_path))
            .map(|(error_path, error)| (error_path, error))
    }

    /// Like [`Self::surfaced_errors`], each error paired with an identity that is shared by
    /// every result extracted from the same delegated response.
    pub(crate) fn surfaced_errors_by_id(&self) -> Vec<(ErrorId, Error)> {
        self.errors_by_id(|error_path| self.is_relevant(error_path))
    }

    /// The errors reported without a path, located here.
    pub(crate) fn pathless_errors_by_id(&self) -> Vec<(ErrorId, Error)> {
        self.errors_by_id(Path::is_empty)
    }

    fn errors_by_id(&self, keep: impl Fn(&Path) -> bool) -> Vec<(ErrorId, Error)> {
        let response = Arc::as_ptr(&self.response) as usize;
        self.response
            .errors
            .iter()
            .enumerate()
            .filter(|(_, (error_path, _))| keep(error_path))
            .map(|(index, (error_path, error))| ((response, index), self.relocate(error_path, error)))
            .collect()
    }

    fn is_relevant(&self, error_path: &Path) -> bool {
        self.cursor.starts_with(error_path) || error_path.starts_with(&self.cursor)
    }

    /// Whether an error was reported at this position, at one of its ancestors, or without a
    /// path.
    pub(crate) fn has_errors_at_or_above(&self) -> bool {
        self.response
            .errors
            .iter()
            .any(|(error_path, _)| self.cursor.starts_with(error_path))
    }

    pub(crate) fn relocate(&self, error_path: &Path, error: &Error) -> Error {
        if error_path.is_empty() {
            relocated_error(error, &self.outer_path(), &Path::empty())
        } else {
            relocated_error(error, &self.response.outer_prefix, error_path)
        }
    }
}
