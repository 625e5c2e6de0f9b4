//! Executors: how a subschema (or a merged schema) runs a GraphQL request.

use std::future::Future;
use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_compiler::ast::OperationType;
use apollo_compiler::resolvers::Execution;
use apollo_compiler::resolvers::FieldError;
use apollo_compiler::resolvers::ObjectValue;
use apollo_compiler::resolvers::ResolveInfo;
use apollo_compiler::resolvers::ResolvedValue;
use apollo_compiler::response::GraphQLError;
use apollo_compiler::response::JsonMap;
use apollo_compiler::response::JsonValue;
use apollo_compiler::validation::Valid;
use async_trait::async_trait;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;

use crate::graphql;

/// Runs GraphQL requests against one schema.
///
/// An `Err` is a failure to execute at all (transport error, timeout…). GraphQL errors,
/// including validation errors, are part of an `Ok` response.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: graphql::Request) -> Result<graphql::Response, BoxError>;
}

#[async_trait]
impl<F, Fut> Executor for F
where
    F: Fn(graphql::Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<graphql::Response, BoxError>> + Send,
{
    async fn execute(&self, request: graphql::Request) -> Result<graphql::Response, BoxError> {
        self(request).await
    }
}

/// Adapts a [`tower::Service`] into an [`Executor`].
///
/// Timeouts, concurrency limits and retries are ordinary tower layers around the service.
#[derive(Clone)]
pub struct ServiceExecutor<S> {
    service: S,
}

impl<S> ServiceExecutor<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> Executor for ServiceExecutor<S>
where
    S: Service<graphql::Request, Response = graphql::Response> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
{
    async fn execute(&self, request: graphql::Request) -> Result<graphql::Response, BoxError> {
        self.service.clone().oneshot(request).await.map_err(Into::into)
    }
}

/// Executes requests against a schema whose data is a JSON value.
///
/// Fields absent from the JSON resolve to null. In JSON objects a `__typename` key selects the
/// concrete type, which abstract fields need.
///
/// Example data for `type Query { user: User }`:
///
/// ```json
/// { "user": { "id": "1", "name": "Ada" } }
/// ```
pub struct LocalExecutor {
    schema: Arc<Valid<Schema>>,
    query: JsonMap,
    mutation: Option<JsonMap>,
}

impl LocalExecutor {
    pub fn new(schema: Arc<Valid<Schema>>, query: JsonMap) -> Self {
        Self {
            schema,
            query,
            mutation: None,
        }
    }

    /// Data for `mutation` operations; mutations are rejected without it.
    pub fn with_mutation(mut self, mutation: JsonMap) -> Self {
        self.mutation = Some(mutation);
        self
    }

    pub fn schema(&self) -> &Arc<Valid<Schema>> {
        &self.schema
    }

    /// Runs the request to completion on the current thread.
    pub fn execute_sync(&self, request: &graphql::Request) -> graphql::Response {
        self.call(request).unwrap_or_else(|errors| {
            graphql::Response::from_errors(errors.into_iter().map(Into::into).collect())
        })
    }

    fn call(&self, request: &graphql::Request) -> Result<graphql::Response, Vec<GraphQLError>> {
        let query = request.query.as_deref().unwrap_or("");
        let doc = ExecutableDocument::parse_and_validate(&self.schema, query, "query.graphql")
            .map_err(|e| e.errors.iter().map(|e| e.to_json()).collect::<Vec<_>>())?;
        let operation = doc
            .operations
            .get(request.operation_name.as_deref())
            .map_err(|e| vec![e.to_graphql_error(&doc.sources)])?;

        let plain_error = |message: &str| vec![GraphQLError::new(message, None, &doc.sources)];
        let root_data = match operation.operation_type {
            OperationType::Query => &self.query,
            OperationType::Mutation => self
                .mutation
                .as_ref()
                .ok_or_else(|| plain_error("mutation is not supported"))?,
            OperationType::Subscription => return Err(plain_error("subscription not supported")),
        };
        let root_type = self
            .schema
            .root_operation(operation.operation_type)
            .ok_or_else(|| plain_error("missing root operation type"))?;
        let initial_value = JsonObject {
            type_name: root_type.as_str(),
            fields: root_data,
        };
        let result = Execution::new(&self.schema, &doc)
            .operation(operation)
            .raw_variable_values(&request.variables)
            .execute_sync(&initial_value);
        match result {
            Ok(response) => Ok(graphql::Response::builder()
                .data(JsonValue::from(response.data))
                .errors(response.errors.into_iter().map(Into::into).collect())
                .build()),
            Err(request_error) => Err(vec![request_error.to_graphql_error(&doc.sources)]),
        }
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn execute(&self, request: graphql::Request) -> Result<graphql::Response, BoxError> {
        Ok(self.execute_sync(&request))
    }
}

struct JsonObject<'a> {
    type_name: &'a str,
    fields: &'a JsonMap,
}

impl ObjectValue for JsonObject<'_> {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn resolve_field<'a>(
        &'a self,
        info: &'a ResolveInfo<'a>,
    ) -> Result<ResolvedValue<'a>, FieldError> {
        match self.fields.get(info.field_name()) {
            Some(value) => resolve_value(value, info),
            None => Ok(ResolvedValue::null()),
        }
    }
}

fn json_type_name(object: &JsonMap) -> Option<&str> {
    object.get("__typename")?.as_str()
}

fn resolve_value<'a>(
    value: &'a JsonValue,
    info: &'a ResolveInfo<'a>,
) -> Result<ResolvedValue<'a>, FieldError> {
    match value {
        JsonValue::Object(map) => Ok(ResolvedValue::object(JsonObject {
            type_name: json_type_name(map)
                .unwrap_or_else(|| info.field_definition().ty.inner_named_type()),
            fields: map,
        })),
        JsonValue::Array(values) => Ok(ResolvedValue::List(Box::new(
            values.iter().map(move |value| resolve_value(value, info)),
        ))),
        json => Ok(ResolvedValue::leaf(json.clone())),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use insta::assert_json_snapshot;
    use serde_json_bytes::json;
    use tower::ServiceBuilder;

    use super::*;

    fn executor() -> LocalExecutor {
        let schema = Schema::parse_and_validate(
            r#"
            type Query { getOuter: Outer, node: Node }
            type Outer { innerList: [Inner]!, name: String }
            type Inner { mandatoryField: String! }
            interface Node { id: ID! }
            type Thing implements Node { id: ID!, label: String }
            "#,
            "schema.graphql",
        )
        .unwrap();
        let data = json!({
            "getOuter": {"innerList": [{"mandatoryField": "test"}, {}]},
            "node": {"__typename": "Thing", "id": "1", "label": "one"},
        });
        LocalExecutor::new(Arc::new(schema), data.as_object().unwrap().clone())
    }

    #[test]
    fn missing_fields_resolve_to_null() {
        let response = executor().execute_sync(
            &graphql::Request::builder()
                .query("{ getOuter { name innerList { mandatoryField } } }")
                .build(),
        );
        assert_eq!(
            response.data,
            Some(json!({"getOuter": {"name": null, "innerList": [{"mandatoryField": "test"}, null]}}))
        );
        assert_eq!(response.errors.len(), 1);
        assert_eq!(
            serde_json_bytes::to_value(&response.errors[0].path).unwrap(),
            json!(["getOuter", "innerList", 1, "mandatoryField"])
        );
    }

    #[test]
    fn typename_selects_the_concrete_type() {
        let response = executor().execute_sync(
            &graphql::Request::builder()
                .query("{ node { __typename id ... on Thing { label } } }")
                .build(),
        );
        assert_json_snapshot!(response, @r###"
        {
          "data": {
            "node": {
              "__typename": "Thing",
              "id": "1",
              "label": "one"
            }
          }
        }
        "###);
    }

    #[test]
    fn invalid_documents_are_errors_without_data() {
        let response = executor()
            .execute_sync(&graphql::Request::builder().query("{ nope }").build());
        assert_eq!(response.data, None);
        assert!(!response.errors.is_empty());
    }

    #[tokio::test]
    async fn closures_and_services_are_executors() {
        let closure = |_request: graphql::Request| async {
            Ok::<_, BoxError>(graphql::Response::builder().data(json!({"a": 1})).build())
        };
        let response = closure.execute(graphql::Request::default()).await.unwrap();
        assert_eq!(response.data, Some(json!({"a": 1})));

        let service = ServiceBuilder::new()
            .timeout(Duration::from_millis(10))
            .service_fn(|_request: graphql::Request| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, BoxError>(graphql::Response::default())
            });
        let executor = ServiceExecutor::new(service);
        assert!(executor.execute(graphql::Request::default()).await.is_err());
    }
}
