use std::sync::Arc;
use std::sync::Mutex;

use apollo_compiler::Schema;
use apollo_compiler::validation::Valid;
use apollo_stitching::Executor;
use apollo_stitching::LocalExecutor;
use apollo_stitching::MergedSchema;
use apollo_stitching::Subschema;
use apollo_stitching::graphql;
use apollo_stitching::json_ext::Path;
use apollo_stitching::json_ext::Value;
use tower::BoxError;

pub(crate) fn schema(name: &str, sdl: &str) -> Valid<Schema> {
    Schema::parse_and_validate(sdl, format!("{name}.graphql")).unwrap()
}

/// A subschema answering from `data`, the value of its query root.
pub(crate) fn local_subschema(name: &str, sdl: &str, data: Value) -> Subschema {
    let schema = schema(name, sdl);
    let executor = LocalExecutor::new(
        Arc::new(schema.clone()),
        data.as_object().cloned().unwrap_or_default(),
    );
    Subschema::new(name, schema, Arc::new(executor)).unwrap()
}

/// Wraps an executor and keeps every request it receives.
pub(crate) struct Recording<E> {
    inner: Arc<E>,
    pub(crate) requests: Arc<Mutex<Vec<graphql::Request>>>,
}

impl<E> Clone for Recording<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            requests: self.requests.clone(),
        }
    }
}

impl<E> Recording<E> {
    pub(crate) fn new(inner: E) -> Self {
        Self {
            inner: Arc::new(inner),
            requests: Default::default(),
        }
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|request| request.query.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl<E: Executor> Executor for Recording<E> {
    async fn execute(&self, request: graphql::Request) -> Result<graphql::Response, BoxError> {
        self.requests.lock().unwrap().push(request.clone());
        self.inner.execute(request).await
    }
}

pub(crate) async fn execute(merged: &MergedSchema, query: &str) -> graphql::Response {
    merged
        .execute(graphql::Request::builder().query(query).build())
        .await
}

pub(crate) fn data(response: &graphql::Response) -> Value {
    response.data.clone().unwrap_or_default()
}

pub(crate) fn error_paths(response: &graphql::Response) -> Vec<Path> {
    response
        .errors
        .iter()
        .filter_map(|error| error.path.clone())
        .collect()
}
