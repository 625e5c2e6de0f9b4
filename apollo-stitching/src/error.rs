//! Stitching errors.
use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::json_ext::Path;
use crate::json_ext::Value;

/// Errors raised while building a merged schema.
///
/// These are setup-time failures: merging stops at the first one and no schema is returned.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// subschema '{subschema}' is not a valid schema: {message}
    InvalidSubschema { subschema: String, message: String },

    /// subschema '{subschema}' is registered more than once
    DuplicateSubschema { subschema: String },

    /// type '{type_name}' is {first_kind} in subschema '{first_subschema}' but {second_kind} in subschema '{second_subschema}'
    ConflictingTypeKinds {
        type_name: String,
        first_subschema: String,
        first_kind: &'static str,
        second_subschema: String,
        second_kind: &'static str,
    },

    /// abstract type '{type_name}' has no way to resolve its concrete type: no subschema defines it and no type resolver was provided
    MissingResolveType { type_name: String },

    /// field '{type_name}.{field_name}' is not provided by any subschema and has no resolver
    MissingFieldResolver {
        type_name: String,
        field_name: String,
    },

    /// a resolver is registered for '{type_name}.{field_name}' which is not a field of the merged schema
    UnknownResolverTarget {
        type_name: String,
        field_name: String,
    },

    /// the selection required by the resolver of '{type_name}.{field_name}' is invalid: {message}
    InvalidRequiredSelection {
        type_name: String,
        field_name: String,
        message: String,
    },

    /// type extensions could not be applied: {message}
    InvalidTypeExtensions { message: String },

    /// the merged schema is invalid: {message}
    InvalidMergedSchema { message: String },
}

/// Errors raised while delegating a field to a subschema.
///
/// Note that these are not returned to the client as such, but are instead converted to a
/// GraphQL [`struct@Error`] at the delegating field.
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum DelegationError {
    /// request to subschema '{subschema}' failed: {reason}
    ///
    /// note that this covers every executor failure, timeouts included, and not GraphQL errors
    SubschemaRequestFailed {
        /// The subschema whose executor failed.
        subschema: String,

        /// The reason the request failed.
        reason: String,
    },

    /// unknown subschema '{subschema}'
    UnknownSubschema {
        /// The requested subschema name.
        subschema: String,
    },

    /// subschema '{subschema}' has no {operation} root type
    MissingRootType {
        subschema: String,
        operation: String,
    },

    /// subschema '{subschema}' has no root field '{field}'
    MissingRootField { subschema: String, field: String },

    /// invalid transform: {reason}
    InvalidTransform { reason: String },
}

impl DelegationError {
    /// Convert the delegation error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut value: Value = serde_json_bytes::to_value(self).unwrap_or_default();
        let mut extensions = value.as_object_mut().map(std::mem::take).unwrap_or_default();
        extensions
            .entry("code")
            .or_insert_with(|| self.extension_code().into());
        match self {
            DelegationError::SubschemaRequestFailed { .. }
            | DelegationError::InvalidTransform { .. } => {
                extensions.remove("reason");
            }
            DelegationError::UnknownSubschema { .. }
            | DelegationError::MissingRootType { .. }
            | DelegationError::MissingRootField { .. } => {}
        }

        Error::builder()
            .message(self.to_string())
            .and_path(path)
            .extensions(extensions)
            .build()
    }
}

impl ErrorExtension for DelegationError {
    fn extension_code(&self) -> String {
        match self {
            DelegationError::SubschemaRequestFailed { .. } => "SUBSCHEMA_REQUEST_FAILED",
            DelegationError::UnknownSubschema { .. } => "UNKNOWN_SUBSCHEMA",
            DelegationError::MissingRootType { .. } => "MISSING_ROOT_TYPE",
            DelegationError::MissingRootField { .. } => "MISSING_ROOT_FIELD",
            DelegationError::InvalidTransform { .. } => "INVALID_TRANSFORM",
        }
        .to_string()
    }
}
