//! Delegation: resolving part of a merged request by sending a root field to a subschema.
//!
//! The outgoing request is built from the outer field nodes in a fixed series of steps:
//!
//! 1. the root field is looked up in the schema the subschema exposes; it keeps the outer
//!    response key, and the selections of every outer field node are merged, with fragment
//!    spreads expanded to inline fragments,
//! 2. arguments are either forwarded as written in the outer document, or, when explicit
//!    values are given, passed as generated variables,
//! 3. selections required by resolvers of the merged schema are added,
//! 4. what the exposed schema does not know is filtered out,
//! 5. the subschema's transforms rewrite the request, in registration order,
//! 6. `__typename` is selected on abstract types and unused variables are dropped.
//!
//! The response goes through the transforms in reverse order, each seeing the request as it
//! received it, and is returned as a [`ProxiedResult`] rooted at the parent of the outer field.

mod selection;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::ast::OperationType;
use apollo_compiler::executable;
use apollo_compiler::executable::SelectionSet;
pub(crate) use selection::RequiredSelections;

use crate::error::DelegationError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::proxied_result::ProxiedResult;
use crate::subschema::Subschema;
use crate::transforms::DelegatedRequest;

/// What a delegated call needs to know about the outer request.
pub(crate) struct DelegationContext<'a> {
    pub(crate) subschema: &'a Subschema,
    pub(crate) document: &'a ExecutableDocument,
    pub(crate) variable_definitions: &'a [Node<ast::VariableDefinition>],
    pub(crate) variables: &'a Object,
    /// Path of the outer field in the merged response.
    pub(crate) path: Path,
    pub(crate) required_selections: &'a RequiredSelections,
}

/// Sends `field_name` to the subschema, with the selections of `fields`.
///
/// Never fails: executor failures and invalid requests are returned as a result without data
/// holding a single error.
#[tracing::instrument(skip_all, fields(
    subschema = %context.subschema.name(),
    field = %field_name,
    path = %context.path,
))]
pub(crate) async fn delegate_to_schema(
    context: &DelegationContext<'_>,
    operation_type: OperationType,
    field_name: &Name,
    fields: &[Node<executable::Field>],
    arguments: Option<&Object>,
) -> ProxiedResult {
    let outer_prefix = context.path.parent().unwrap_or_default();
    let subschema = context.subschema;
    let failed = |error: DelegationError| {
        ProxiedResult::from_error(error.to_graphql_error(None), outer_prefix.clone())
    };

    let request = match build_request(context, operation_type, field_name, fields, arguments) {
        Ok(request) => request,
        Err(error) => return failed(error),
    };

    let mut received = Vec::with_capacity(subschema.transforms().len());
    let mut request = request;
    for transform in subschema.transforms() {
        match transform.transform_request(request.clone(), subschema.schema()) {
            Ok(transformed) => {
                received.push(request);
                request = transformed;
            }
            Err(error) => return failed(error),
        }
    }
    selection::add_typename_to_abstract(subschema.schema(), &mut request.root_field.selection_set);
    prune_variables(&mut request);

    let outgoing = request.to_request();
    tracing::debug!(query = ?outgoing.query, "delegating to subschema");
    let response = match subschema.executor().execute(outgoing).await {
        Ok(response) => response,
        Err(error) => {
            tracing::debug!(%error, "subschema request failed");
            return failed(DelegationError::SubschemaRequestFailed {
                subschema: subschema.name().to_string(),
                reason: error.to_string(),
            });
        }
    };

    let response = subschema
        .transforms()
        .iter()
        .zip(&received)
        .rev()
        .fold(response, |response, (transform, request)| {
            transform.transform_result(response, request)
        });
    ProxiedResult::new(response, outer_prefix)
}

fn build_request(
    context: &DelegationContext<'_>,
    operation_type: OperationType,
    field_name: &Name,
    fields: &[Node<executable::Field>],
    arguments: Option<&Object>,
) -> Result<DelegatedRequest, DelegationError> {
    let subschema = context.subschema;
    let schema = subschema.exposed_schema();
    let root_type = schema.root_operation(operation_type).ok_or_else(|| {
        DelegationError::MissingRootType {
            subschema: subschema.name().to_string(),
            operation: operation_type.to_string(),
        }
    })?;
    let missing_field = || DelegationError::MissingRootField {
        subschema: subschema.name().to_string(),
        field: field_name.to_string(),
    };
    let definition = schema
        .type_field(root_type, field_name)
        .map_err(|_| missing_field())?;

    let mut root_field = executable::Field::new(field_name.clone(), definition.node.clone());
    if let Some(response_key) = fields.first().map(|field| field.response_key())
        && response_key != field_name
    {
        root_field = root_field.with_alias(response_key.clone());
    }
    root_field.selection_set = SelectionSet::new(definition.ty.inner_named_type().clone());
    for field in fields {
        let expanded = selection::expand_fragments(context.document, &field.selection_set);
        root_field.selection_set.extend(expanded.selections);
    }

    let mut variable_definitions = context.variable_definitions.to_vec();
    let mut variables = context.variables.clone();
    match arguments {
        Some(arguments) => {
            for (index, (name, value)) in arguments.iter().enumerate() {
                let Some(argument) = definition.argument_by_name(name.as_str()) else {
                    continue;
                };
                let Ok(variable) = Name::new(&format!("_v{index}_{}", argument.name)) else {
                    continue;
                };
                variable_definitions.push(Node::new(ast::VariableDefinition {
                    name: variable.clone(),
                    ty: argument.ty.clone(),
                    default_value: None,
                    directives: ast::DirectiveList(vec![]),
                }));
                root_field.arguments.push(Node::new(ast::Argument {
                    name: argument.name.clone(),
                    value: Node::new(ast::Value::Variable(variable.clone())),
                }));
                variables.insert(variable.as_str(), value.clone());
            }
        }
        None => {
            if let Some(field) = fields.first() {
                root_field.arguments = field.arguments.clone();
            }
        }
    }

    selection::add_required_selections(&mut root_field.selection_set, context.required_selections);

    let mut root = SelectionSet::new(root_type.clone());
    root.push(root_field);
    let root_field = selection::filter_to_schema(schema, &root)
        .fields()
        .next()
        .map(|field| executable::Field::clone(field))
        .ok_or_else(missing_field)?;

    Ok(DelegatedRequest {
        operation_type,
        root_field,
        variable_definitions,
        variables,
    })
}

fn prune_variables(request: &mut DelegatedRequest) {
    let used = selection::used_variables(&request.root_field);
    request
        .variable_definitions
        .retain(|definition| used.contains(&definition.name));
    request.variables = std::mem::take(&mut request.variables)
        .into_iter()
        .filter(|(name, _)| used.contains(name.as_str()))
        .collect();
}
