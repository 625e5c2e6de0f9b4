//! Transforms change how a subschema is exposed in the merged schema.
//!
//! A transform acts at three points: on the subschema's type graph when the subschema is
//! registered, on every request delegated to the subschema, and on every response coming back.
//! Request transforms run in registration order, result transforms in reverse order, each one
//! seeing the request as it was before it transformed it.

mod filter;
mod hoist;
mod rename;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::ast::OperationType;
use apollo_compiler::executable;
use apollo_compiler::validation::Valid;
pub use filter::FilterRootFields;
pub use hoist::HoistField;
use itertools::Itertools;
pub use rename::RenameRootFields;
use serde_json_bytes::ByteString;

use crate::error::DelegationError;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::PathElement;
use crate::json_ext::Value;

/// A schema, request and result transformation attached to a [`Subschema`](crate::Subschema).
///
/// Every method defaults to the identity.
pub trait Transform: Send + Sync {
    /// Changes the type graph the subschema contributes to the merge.
    fn transform_schema(&self, _schema: &mut Schema) {}

    /// Rewrites a request expressed against the transformed schema so that `target`, the
    /// schema the subschema was registered with, understands it.
    fn transform_request(
        &self,
        request: DelegatedRequest,
        _target: &Valid<Schema>,
    ) -> Result<DelegatedRequest, DelegationError> {
        Ok(request)
    }

    /// Maps a response back to the vocabulary of `request`, the request as this transform
    /// received it.
    fn transform_result(
        &self,
        response: graphql::Response,
        _request: &DelegatedRequest,
    ) -> graphql::Response {
        response
    }
}

/// A single root field request on its way to a subschema.
#[derive(Clone, Debug)]
pub struct DelegatedRequest {
    pub operation_type: OperationType,
    pub root_field: executable::Field,
    pub variable_definitions: Vec<Node<ast::VariableDefinition>>,
    pub variables: Object,
}

impl DelegatedRequest {
    /// The key of the root field in the subschema's response data.
    pub fn response_key(&self) -> &Name {
        self.root_field.response_key()
    }

    pub fn to_request(&self) -> graphql::Request {
        let mut query = self.operation_type.to_string();
        if !self.variable_definitions.is_empty() {
            let definitions = self
                .variable_definitions
                .iter()
                .map(|definition| definition.serialize().no_indent().to_string())
                .join(", ");
            query = format!("{query}({definitions})");
        }
        let query = format!(
            "{query} {{ {} }}",
            self.root_field.serialize().no_indent()
        );
        graphql::Request::builder()
            .query(query)
            .variables(self.variables.clone())
            .build()
    }
}

/// Renames the root key of a response and the first segment of its error paths.
pub(crate) fn rename_response_key(response: &mut graphql::Response, from: &str, to: &str) {
    if from == to {
        return;
    }
    if let Some(Value::Object(data)) = response.data.as_mut()
        && let Some(value) = data.remove(from)
    {
        data.insert(ByteString::from(to), value);
    }
    for error in &mut response.errors {
        if let Some(path) = error.path.as_mut()
            && let Some(PathElement::Key(key)) = path.0.first_mut()
            && key == from
        {
            *key = to.to_string();
        }
    }
}
