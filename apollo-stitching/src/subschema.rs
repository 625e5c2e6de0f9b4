use std::fmt;
use std::sync::Arc;

use apollo_compiler::Schema;
use apollo_compiler::validation::Valid;

use crate::error::ConfigurationError;
use crate::executor::Executor;
use crate::heal::heal_schema;
use crate::transforms::Transform;

/// One of the independent schemas a merged schema is built from.
///
/// The executor always receives requests in the vocabulary of the schema it was registered
/// with. Transforms may change the schema the subschema exposes to the merge; requests are
/// transformed back before they reach the executor.
#[derive(Clone)]
pub struct Subschema {
    name: String,
    schema: Arc<Valid<Schema>>,
    exposed_schema: Arc<Valid<Schema>>,
    executor: Arc<dyn Executor>,
    transforms: Vec<Arc<dyn Transform>>,
}

impl Subschema {
    pub fn new(
        name: impl Into<String>,
        schema: Valid<Schema>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, ConfigurationError> {
        Self::with_transforms(name, schema, executor, Vec::new())
    }

    /// A subschema whose exposed schema and requests go through `transforms`, in order.
    ///
    /// The transformed schema is healed before it is validated.
    pub fn with_transforms(
        name: impl Into<String>,
        schema: Valid<Schema>,
        executor: Arc<dyn Executor>,
        transforms: Vec<Arc<dyn Transform>>,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let exposed_schema = if transforms.is_empty() {
            schema.clone()
        } else {
            let mut exposed = schema.clone().into_inner();
            for transform in &transforms {
                transform.transform_schema(&mut exposed);
            }
            heal_schema(&mut exposed);
            exposed
                .validate()
                .map_err(|e| ConfigurationError::InvalidSubschema {
                    subschema: name.clone(),
                    message: e.errors.to_string(),
                })?
        };
        Ok(Self {
            name,
            schema: Arc::new(schema),
            exposed_schema: Arc::new(exposed_schema),
            executor,
            transforms,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema the executor understands.
    pub fn schema(&self) -> &Arc<Valid<Schema>> {
        &self.schema
    }

    /// The schema contributed to the merge, after transforms.
    pub fn exposed_schema(&self) -> &Arc<Valid<Schema>> {
        &self.exposed_schema
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn transforms(&self) -> &[Arc<dyn Transform>] {
        &self.transforms
    }
}

impl fmt::Debug for Subschema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subschema")
            .field("name", &self.name)
            .field("transforms", &self.transforms.len())
            .finish_non_exhaustive()
    }
}
