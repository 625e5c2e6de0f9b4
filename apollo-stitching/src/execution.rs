//! Executing requests against a merged schema.
//!
//! The resolver engine completes values synchronously, while delegation is asynchronous. A
//! request is therefore executed in passes. Each pass runs the engine over the whole
//! operation: fields whose value is known are completed, fields that still need a delegated or
//! custom resolver call are recorded as pending and read as a stand-in for now: null, or a
//! value of the field's type when it is non-null, so that siblings keep resolving. Pending fields are
//! then resolved (concurrently for queries, in document order for mutations), their results
//! cached by response path, and the next pass starts. The pass that records nothing pending
//! produces the response.
//!
//! Errors carried by delegated results are surfaced through the engine, so it applies null
//! propagation: a field whose value is null with errors fails with a placeholder message
//! naming the errors, which are put back in place of the engine's error when the pass ends.

use std::cell::RefCell;
use std::collections::HashMap;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast::OperationType;
use apollo_compiler::ast::Type;
use apollo_compiler::collections::HashSet;
use apollo_compiler::executable;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::request::RequestError;
use apollo_compiler::resolvers::Execution;
use apollo_compiler::resolvers::FieldError;
use apollo_compiler::resolvers::ObjectValue;
use apollo_compiler::resolvers::ResolveInfo;
use apollo_compiler::resolvers::ResolvedValue;
use apollo_compiler::response::ExecutionResponse;
use apollo_compiler::response::JsonValue;
use futures::future::join_all;

use crate::graphql;
use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::merge::FieldResolver;
use crate::merge::MergedInner;
use crate::merge::Resolution;
use crate::merge::ResolveContext;
use crate::merge::run_resolver;
use crate::proxied_result::ErrorId;
use crate::proxied_result::ProxiedResult;

const ERROR_MARKER: &str = "__stitched_error_";

/// The parts of the outer request delegated calls need.
pub(crate) struct RequestScope<'a> {
    pub(crate) merged: &'a MergedInner,
    pub(crate) document: &'a ExecutableDocument,
    pub(crate) operation: &'a executable::Operation,
    pub(crate) variables: &'a Object,
}

/// A field waiting for its resolver.
#[derive(Debug)]
pub(crate) struct PendingField {
    pub(crate) path: Path,
    pub(crate) parent_type: String,
    pub(crate) field_name: Name,
    pub(crate) response_key: Name,
    pub(crate) arguments: Object,
    /// Every node of the field in the operation, after field merging.
    pub(crate) fields: Vec<Node<executable::Field>>,
    pub(crate) parent: Option<ProxiedResult>,
}

#[derive(Clone, Debug)]
enum FieldOutcome {
    Value(ProxiedResult),
    Failed(Error),
}

pub(crate) async fn execute(merged: &MergedInner, request: graphql::Request) -> graphql::Response {
    let Some(query) = request.query.as_deref() else {
        return graphql::Response::from_errors(vec![with_code(
            Error::builder().message("missing query string").build(),
            "GRAPHQL_VALIDATION_FAILED",
        )]);
    };
    let document =
        match ExecutableDocument::parse_and_validate(&merged.schema, query, "query.graphql") {
            Ok(document) => document,
            Err(invalid) => {
                return graphql::Response::from_errors(
                    invalid
                        .errors
                        .iter()
                        .map(|error| with_code(error.to_json().into(), "GRAPHQL_VALIDATION_FAILED"))
                        .collect(),
                );
            }
        };
    let operation = match document.operations.get(request.operation_name.as_deref()) {
        Ok(operation) => operation,
        Err(error) => {
            return graphql::Response::from_errors(vec![with_code(
                error.to_graphql_error(&document.sources).into(),
                "GRAPHQL_UNKNOWN_OPERATION_NAME",
            )]);
        }
    };
    if operation.operation_type == OperationType::Subscription {
        return graphql::Response::from_errors(vec![with_code(
            Error::builder()
                .message("subscriptions are not supported by merged schemas")
                .build(),
            "SUBSCRIPTIONS_UNSUPPORTED",
        )]);
    }
    let Some(root_type) = merged.schema.root_operation(operation.operation_type) else {
        return graphql::Response::from_errors(vec![with_code(
            Error::builder()
                .message(format!("no {} root type", operation.operation_type))
                .build(),
            "GRAPHQL_VALIDATION_FAILED",
        )]);
    };

    let scope = RequestScope {
        merged,
        document: &document,
        operation,
        variables: &request.variables,
    };
    let mut outcomes: HashMap<Path, FieldOutcome> = HashMap::new();
    let mut passes = 0;
    loop {
        passes += 1;
        let (response, pending) = {
            let pass = Pass::new(merged, &outcomes);
            let root = ProxiedObject {
                pass: &pass,
                type_name: root_type.to_string(),
                path: Path::empty(),
                value: None,
                stand_in: false,
            };
            let result = Execution::new(&merged.schema, &document)
                .operation(operation)
                .raw_variable_values(&request.variables)
                .execute_sync(&root);
            pass.finish(result, &document, operation)
        };
        if pending.is_empty() {
            tracing::debug!(passes, "merged request completed");
            return response;
        }
        tracing::trace!(pass = passes, pending = pending.len(), "resolving pending fields");

        let resolved = if operation.operation_type == OperationType::Mutation {
            let mut resolved = Vec::with_capacity(pending.len());
            for field in &pending {
                resolved.push(resolve_pending(&scope, field).await);
            }
            resolved
        } else {
            join_all(pending.iter().map(|field| resolve_pending(&scope, field))).await
        };
        for (field, outcome) in pending.into_iter().zip(resolved) {
            outcomes.insert(field.path, outcome);
        }
    }
}

async fn resolve_pending(scope: &RequestScope<'_>, field: &PendingField) -> FieldOutcome {
    let null = || FieldOutcome::Value(ProxiedResult::from_value(Value::Null, field.path.clone()));
    let Some(resolver) = scope.merged.field_resolver(&field.parent_type, &field.field_name) else {
        return null();
    };
    let context = ResolveContext { scope, field };
    match run_resolver(resolver, &context).await {
        Ok(Resolution::Defined(result)) => FieldOutcome::Value(result),
        Ok(Resolution::NotDefined) => null(),
        Err(mut error) => {
            if error.path.is_none() {
                error.path = Some(field.path.clone());
            }
            FieldOutcome::Failed(error)
        }
    }
}

fn with_code(mut error: Error, code: &str) -> Error {
    error
        .extensions
        .entry("code")
        .or_insert_with(|| Value::from(code));
    error
}

/// One run of the resolver engine.
struct Pass<'a> {
    merged: &'a MergedInner,
    outcomes: &'a HashMap<Path, FieldOutcome>,
    pending: RefCell<Vec<PendingField>>,
    /// Errors behind each placeholder message, by placeholder number.
    surfaced: RefCell<Vec<Vec<Error>>>,
    /// Errors of delegated results that no failed field carries: path-less errors of non-null
    /// results and errors of nullable list items.
    detached: RefCell<Vec<Error>>,
    seen: RefCell<HashSet<ErrorId>>,
}

impl<'a> Pass<'a> {
    fn new(merged: &'a MergedInner, outcomes: &'a HashMap<Path, FieldOutcome>) -> Self {
        Self {
            merged,
            outcomes,
            pending: RefCell::default(),
            surfaced: RefCell::default(),
            detached: RefCell::default(),
            seen: RefCell::default(),
        }
    }

    /// Returns a field error whose message stands for `errors`.
    fn surface(&self, errors: Vec<Error>) -> FieldError {
        let mut surfaced = self.surfaced.borrow_mut();
        surfaced.push(errors);
        FieldError {
            message: format!("{ERROR_MARKER}{}", surfaced.len() - 1),
        }
    }

    /// Errors relevant to `result` not surfaced yet in this pass.
    fn take_errors(&self, result: &ProxiedResult) -> Vec<Error> {
        let mut seen = self.seen.borrow_mut();
        result
            .surfaced_errors_by_id()
            .into_iter()
            .filter(|(id, _)| seen.insert(*id))
            .map(|(_, error)| error)
            .collect()
    }

    /// Keeps the path-less errors of a non-null result, which no null value will surface.
    fn detach_global_errors(&self, result: &ProxiedResult) {
        if result.is_null() {
            return;
        }
        let mut seen = self.seen.borrow_mut();
        let global = result
            .pathless_errors_by_id()
            .into_iter()
            .filter(|(id, _)| seen.insert(*id))
            .map(|(_, error)| error);
        self.detached.borrow_mut().extend(global);
    }

    fn complete<'p>(
        &'p self,
        ty: &'p Type,
        result: ProxiedResult,
    ) -> Result<ResolvedValue<'p>, FieldError> {
        if result.is_null() {
            let errors = self.take_errors(&result);
            return if errors.is_empty() {
                Ok(ResolvedValue::null())
            } else {
                Err(self.surface(errors))
            };
        }
        match result.data() {
            Some(Value::Array(items)) => {
                let len = items.len();
                let item_type = match ty {
                    Type::List(inner) | Type::NonNullList(inner) => inner.as_ref(),
                    Type::Named(_) | Type::NonNullNamed(_) => ty,
                };
                Ok(ResolvedValue::List(Box::new((0..len).map(move |index| {
                    self.complete_item(item_type, result.extract_index(index))
                }))))
            }
            Some(Value::Object(object)) => {
                let type_name = self.concrete_type(ty, object);
                Ok(ResolvedValue::object(ProxiedObject {
                    pass: self,
                    type_name,
                    path: result.outer_path(),
                    value: Some(result.clone()),
                    stand_in: false,
                }))
            }
            Some(leaf) => Ok(ResolvedValue::leaf(leaf.clone())),
            None => Ok(ResolvedValue::null()),
        }
    }

    /// Completes one list item: a null item with errors fails alone.
    ///
    /// A nullable item is left null and keeps its errors. A non-null item fails the list, and
    /// the engine nullifies the nearest nullable ancestor.
    fn complete_item<'p>(
        &'p self,
        item_type: &'p Type,
        item: ProxiedResult,
    ) -> Result<ResolvedValue<'p>, FieldError> {
        if !item.is_null() {
            return self.complete(item_type, item);
        }
        let errors = self.take_errors(&item);
        if errors.is_empty() {
            return Ok(ResolvedValue::null());
        }
        if item_type.is_non_null() {
            return Err(self.surface(errors));
        }
        self.detached.borrow_mut().extend(errors);
        Ok(ResolvedValue::null())
    }

    /// Read in place of a pending field until its resolver has run.
    ///
    /// Non-null fields get a value of their type, and the objects of such values answer every
    /// field the same way, so the engine does not nullify the siblings of a pending field.
    fn stand_in<'p>(&'p self, ty: &Type) -> ResolvedValue<'p> {
        if !ty.is_non_null() {
            return ResolvedValue::null();
        }
        if ty.is_list() {
            return ResolvedValue::list(std::iter::empty());
        }
        let named = ty.inner_named_type();
        let object = |type_name: &Name| {
            ResolvedValue::object(ProxiedObject {
                pass: self,
                type_name: type_name.to_string(),
                path: Path::empty(),
                value: None,
                stand_in: true,
            })
        };
        let schema = &self.merged.schema;
        match schema.types.get(named) {
            Some(ExtendedType::Object(_)) => object(named),
            Some(ExtendedType::Union(union_)) => union_
                .members
                .first()
                .map_or_else(ResolvedValue::null, |member| object(&member.name)),
            Some(ExtendedType::Interface(_)) => schema
                .types
                .iter()
                .find_map(|(name, definition)| match definition {
                    ExtendedType::Object(definition)
                        if definition.implements_interfaces.contains(named) =>
                    {
                        Some(name)
                    }
                    _ => None,
                })
                .map_or_else(ResolvedValue::null, object),
            Some(ExtendedType::Enum(enum_)) => enum_
                .values
                .keys()
                .next()
                .map_or_else(ResolvedValue::null, |value| ResolvedValue::leaf(value.as_str())),
            _ => ResolvedValue::leaf(match named.as_str() {
                "Int" => JsonValue::from(0),
                "Float" => JsonValue::from(0.0),
                "Boolean" => JsonValue::from(false),
                _ => JsonValue::from(""),
            }),
        }
    }

    fn concrete_type(&self, ty: &Type, object: &Object) -> String {
        if let Some(type_name) = object.get("__typename").and_then(Value::as_str) {
            return type_name.to_string();
        }
        let named = ty.inner_named_type();
        self.merged
            .type_resolvers
            .get(named.as_str())
            .and_then(|resolver| resolver.resolve(object))
            .unwrap_or_else(|| named.to_string())
    }

    fn finish(
        self,
        result: Result<ExecutionResponse, RequestError>,
        document: &ExecutableDocument,
        operation: &executable::Operation,
    ) -> (graphql::Response, Vec<PendingField>) {
        let pending = self.pending.into_inner();
        // Locations point at the outer field; the subschema's stay on `original_error`.
        let locate = |mut error: Error, surfacing_field: &[graphql::Location]| {
            error.locations = error
                .path
                .as_ref()
                .and_then(|path| field_location(document, operation, path))
                .map_or_else(|| surfacing_field.to_vec(), |location| vec![location]);
            error
        };
        let response = match result {
            Ok(response) => {
                let surfaced = self.surfaced.into_inner();
                let mut errors = Vec::with_capacity(response.errors.len());
                for error in response.errors {
                    let error = Error::from(error);
                    match marker_index(&error.message).and_then(|index| surfaced.get(index)) {
                        Some(original) => errors.extend(
                            original
                                .iter()
                                .cloned()
                                .map(|original| locate(original, &error.locations)),
                        ),
                        None => errors.push(error),
                    }
                }
                errors.extend(
                    self.detached
                        .into_inner()
                        .into_iter()
                        .map(|error| locate(error, &[])),
                );
                graphql::Response::builder()
                    .data(JsonValue::from(response.data))
                    .errors(errors)
                    .build()
            }
            Err(error) => graphql::Response::from_errors(vec![
                error.to_graphql_error(&document.sources).into(),
            ]),
        };
        (response, pending)
    }
}

/// The location of the deepest field of `operation` the keys of `path` lead to.
fn field_location(
    document: &ExecutableDocument,
    operation: &executable::Operation,
    path: &Path,
) -> Option<graphql::Location> {
    let mut selection_set = &operation.selection_set;
    let mut location = None;
    for key in path.iter().filter_map(PathElement::as_key) {
        let Some(field) = find_field(document, selection_set, key) else {
            break;
        };
        location = field.location().or(location);
        selection_set = &field.selection_set;
    }
    let line_column = location?.line_column(&document.sources)?;
    Some(graphql::Location {
        line: line_column.line as u32,
        column: line_column.column as u32,
    })
}

fn find_field<'d>(
    document: &'d ExecutableDocument,
    selection_set: &'d executable::SelectionSet,
    response_key: &str,
) -> Option<&'d Node<executable::Field>> {
    selection_set
        .selections
        .iter()
        .find_map(|selection| match selection {
            executable::Selection::Field(field) => {
                (field.response_key().as_str() == response_key).then_some(field)
            }
            executable::Selection::InlineFragment(inline) => {
                find_field(document, &inline.selection_set, response_key)
            }
            executable::Selection::FragmentSpread(spread) => document
                .fragments
                .get(&spread.fragment_name)
                .and_then(|fragment| find_field(document, &fragment.selection_set, response_key)),
        })
}

fn marker_index(message: &str) -> Option<usize> {
    let (_, rest) = message.split_once(ERROR_MARKER)?;
    let digits = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(rest, |(end, _)| &rest[..end]);
    digits.parse().ok()
}

/// An object of the merged response.
///
/// Its value is `None` for the root object, and for objects whose fields all need a resolver.
struct ProxiedObject<'p> {
    pass: &'p Pass<'p>,
    type_name: String,
    path: Path,
    value: Option<ProxiedResult>,
    /// Stands in for a pending value: fields are answered without resolvers.
    stand_in: bool,
}

impl ObjectValue for ProxiedObject<'_> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> Result<ResolvedValue<'a>, FieldError> {
        let pass = self.pass;
        let Some(first) = info.field_selections().first() else {
            return Ok(ResolvedValue::null());
        };
        let response_key = first.response_key();
        let ty = &info.field_definition().ty;
        if self.stand_in {
            return Ok(pass.stand_in(ty));
        }
        let resolver = pass.merged.field_resolver(&self.type_name, info.field_name());

        if let (Some(FieldResolver::Proxied) | None, Some(parent)) = (resolver, &self.value) {
            return pass.complete(ty, parent.extract_key(response_key.as_str()));
        }
        if self.value.is_none() && matches!(resolver, Some(FieldResolver::Proxied) | None) {
            return Ok(ResolvedValue::null());
        }

        let path = self.path.with_key(response_key.as_str());
        match pass.outcomes.get(&path) {
            Some(FieldOutcome::Value(result)) => {
                pass.detach_global_errors(result);
                pass.complete(ty, result.clone())
            }
            Some(FieldOutcome::Failed(error)) => Err(pass.surface(vec![error.clone()])),
            None => {
                pass.pending.borrow_mut().push(PendingField {
                    path,
                    parent_type: self.type_name.clone(),
                    field_name: info.field_definition().name.clone(),
                    response_key: response_key.clone(),
                    arguments: info.arguments().clone(),
                    fields: info
                        .field_selections()
                        .iter()
                        .map(|field| Node::new(executable::Field::clone(field)))
                        .collect(),
                    parent: self.value.clone(),
                });
                Ok(pass.stand_in(ty))
            }
        }
    }
}
