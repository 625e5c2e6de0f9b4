use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast::OperationType;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;

use super::DelegatedRequest;
use super::Transform;
use super::rename_response_key;
use crate::error::DelegationError;
use crate::graphql;

/// Exposes root fields of one operation type under new names.
///
/// ```
/// use apollo_compiler::ast::OperationType;
/// use apollo_compiler::name;
/// use apollo_stitching::transforms::RenameRootFields;
///
/// let transform = RenameRootFields::new(OperationType::Query).rename(name!("user"), name!("userById"));
/// ```
#[derive(Clone, Debug)]
pub struct RenameRootFields {
    operation_type: OperationType,
    /// (name in the subschema, exposed name)
    renames: Vec<(Name, Name)>,
}

impl RenameRootFields {
    pub fn new(operation_type: OperationType) -> Self {
        Self {
            operation_type,
            renames: Vec::new(),
        }
    }

    /// Exposes the root field `from` as `to`.
    pub fn rename(mut self, from: Name, to: Name) -> Self {
        self.renames.push((from, to));
        self
    }

    fn exposed_name(&self, original: &str) -> Option<&Name> {
        self.renames
            .iter()
            .find(|(from, _)| from.as_str() == original)
            .map(|(_, to)| to)
    }

    fn original_name(&self, exposed: &str) -> Option<&Name> {
        self.renames
            .iter()
            .find(|(_, to)| to.as_str() == exposed)
            .map(|(from, _)| from)
    }
}

impl Transform for RenameRootFields {
    fn transform_schema(&self, schema: &mut Schema) {
        let Some(root) = schema.root_operation(self.operation_type).cloned() else {
            return;
        };
        let Some(ExtendedType::Object(root)) = schema.types.get_mut(&root) else {
            return;
        };
        let root = root.make_mut();
        root.fields = std::mem::take(&mut root.fields)
            .into_iter()
            .map(|(name, mut field)| match self.exposed_name(&name) {
                Some(exposed) => {
                    field.make_mut().name = exposed.clone();
                    (exposed.clone(), field)
                }
                None => (name, field),
            })
            .collect();
    }

    fn transform_request(
        &self,
        mut request: DelegatedRequest,
        _target: &Valid<Schema>,
    ) -> Result<DelegatedRequest, DelegationError> {
        if request.operation_type == self.operation_type
            && let Some(original) = self.original_name(&request.root_field.name)
        {
            request.root_field.name = original.clone();
        }
        Ok(request)
    }

    fn transform_result(
        &self,
        mut response: graphql::Response,
        request: &DelegatedRequest,
    ) -> graphql::Response {
        if request.operation_type == self.operation_type
            && request.root_field.alias.is_none()
            && let Some(original) = self.original_name(&request.root_field.name)
        {
            rename_response_key(&mut response, original, &request.root_field.name);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::transforms::test_support::*;

    const SDL: &str = "type Query { user(id: ID!): User, other: Int } type User { name: String }";

    fn transform() -> RenameRootFields {
        RenameRootFields::new(OperationType::Query).rename(name!("user"), name!("userById"))
    }

    #[test]
    fn renames_the_root_field_in_place() {
        let mut schema = schema(SDL).into_inner();
        transform().transform_schema(&mut schema);
        let root = schema.get_object("Query").unwrap();
        assert_eq!(
            root.fields.keys().map(|name| name.as_str()).collect::<Vec<_>>(),
            vec!["userById", "other"]
        );
        assert_eq!(root.fields["userById"].name.as_str(), "userById");
    }

    #[test]
    fn requests_use_the_subschema_name_and_results_the_exposed_one() {
        let original = schema(SDL);
        let mut exposed = original.clone().into_inner();
        transform().transform_schema(&mut exposed);
        let exposed = exposed.validate().unwrap();

        let request = root_request(&exposed, r#"{ userById(id: "1") { name } }"#);
        let transformed = transform()
            .transform_request(request.clone(), &original)
            .unwrap();
        assert_eq!(
            transformed.to_request().query.as_deref(),
            Some(r#"query { user(id: "1") { name } }"#)
        );

        let response = graphql::Response::builder()
            .data(json!({"user": null}))
            .error(
                graphql::Error::builder()
                    .message("not found")
                    .path(path!["user"])
                    .build(),
            )
            .build();
        let response = transform().transform_result(response, &request);
        assert_eq!(response.data, Some(json!({"userById": null})));
        assert_eq!(response.errors[0].path, Some(path!["userById"]));
    }

    #[test]
    fn aliased_fields_keep_their_response_key() {
        let original = schema(SDL);
        let mut exposed = original.clone().into_inner();
        transform().transform_schema(&mut exposed);
        let exposed = exposed.validate().unwrap();

        let request = root_request(&exposed, r#"{ me: userById(id: "1") { name } }"#);
        let response = graphql::Response::builder()
            .data(json!({"me": {"name": "Ada"}}))
            .build();
        let response = transform().transform_result(response, &request);
        assert_eq!(response.data, Some(json!({"me": {"name": "Ada"}})));
    }
}
