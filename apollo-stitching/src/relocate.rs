//! Moving errors from a delegated response into the merged response.
//!
//! A subschema reports errors with paths into *its* response. Once the delegated result is
//! grafted into the merged response those paths must be rewritten so they point at the same
//! data in the outer response.

use std::borrow::Cow;

use crate::graphql::Error;
use crate::json_ext::Path;

/// Something that can be turned into a located GraphQL error.
///
/// Implemented for GraphQL [`Error`]s and for plain failures (any `std::error::Error`), which
/// have no path of their own and are relocated as if their inner path were empty.
pub trait Relocatable {
    fn as_graphql_error(&self) -> Cow<'_, Error>;
}

impl Relocatable for Error {
    fn as_graphql_error(&self) -> Cow<'_, Error> {
        Cow::Borrowed(self)
    }
}

impl Relocatable for dyn std::error::Error + Send + Sync {
    fn as_graphql_error(&self) -> Cow<'_, Error> {
        Cow::Owned(Error::builder().message(self.to_string()).build())
    }
}

/// Returns a new error located at `outer_prefix` followed by `inner_path`.
///
/// Message, locations and extensions are copied unchanged, as is the link to the error the
/// input was itself derived from. The input is never modified.
pub fn relocated_error<E>(error: &E, outer_prefix: &Path, inner_path: &Path) -> Error
where
    E: Relocatable + ?Sized,
{
    let error = error.as_graphql_error();
    Error::builder()
        .message(error.message.clone())
        .locations(error.locations.clone())
        .path(outer_prefix.join(inner_path))
        .extensions(error.extensions.clone())
        .build()
        .inherit_origin(&error)
}
