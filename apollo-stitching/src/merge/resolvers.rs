//! How fields of a merged schema get their values.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::ast::OperationType;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::check_result::check_result_and_handle_errors;
use crate::delegate::DelegationContext;
use crate::delegate::delegate_to_schema;
use crate::error::DelegationError;
use crate::execution::PendingField;
use crate::execution::RequestScope;
use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::proxied_result::ProxiedResult;

/// The resolver of one field of a merged schema.
#[derive(Clone)]
pub enum FieldResolver {
    /// Sends the field, as a root field with the same name and arguments, to a subschema.
    Delegate { subschema: String },
    /// Reads the field from the parent value, which was delegated with it.
    Proxied,
    /// A user-provided resolver.
    Custom(Arc<dyn Resolver>),
    /// Tries each resolver in order; the first that does not answer
    /// [`Resolution::NotDefined`] wins. The field is null if none does.
    Chain(Vec<FieldResolver>),
}

impl FieldResolver {
    pub fn delegate(subschema: impl Into<String>) -> Self {
        Self::Delegate {
            subschema: subschema.into(),
        }
    }

    pub fn custom(resolver: impl Resolver + 'static) -> Self {
        Self::Custom(Arc::new(resolver))
    }

    pub fn chain(resolvers: impl IntoIterator<Item = FieldResolver>) -> Self {
        Self::Chain(resolvers.into_iter().collect())
    }

    /// The selections the custom resolvers in this resolver require on the parent.
    pub(crate) fn requirements(&self) -> Vec<&str> {
        match self {
            FieldResolver::Custom(resolver) => resolver.requires().into_iter().collect(),
            FieldResolver::Chain(resolvers) => resolvers
                .iter()
                .flat_map(FieldResolver::requirements)
                .collect(),
            FieldResolver::Delegate { .. } | FieldResolver::Proxied => Vec::new(),
        }
    }

    /// Subschemas named by delegating resolvers.
    pub(crate) fn subschemas(&self) -> Vec<&str> {
        match self {
            FieldResolver::Delegate { subschema } => vec![subschema.as_str()],
            FieldResolver::Chain(resolvers) => resolvers
                .iter()
                .flat_map(FieldResolver::subschemas)
                .collect(),
            FieldResolver::Custom(_) | FieldResolver::Proxied => Vec::new(),
        }
    }
}

impl fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldResolver::Delegate { subschema } => {
                f.debug_struct("Delegate").field("subschema", subschema).finish()
            }
            FieldResolver::Proxied => f.write_str("Proxied"),
            FieldResolver::Custom(_) => f.write_str("Custom"),
            FieldResolver::Chain(resolvers) => f.debug_tuple("Chain").field(resolvers).finish(),
        }
    }
}

/// The outcome of a resolver.
#[derive(Clone, Debug)]
pub enum Resolution {
    /// A value, possibly null, positioned at the resolved field.
    Defined(ProxiedResult),
    /// The resolver has nothing to say about this field; distinct from an explicit null.
    NotDefined,
}

/// A user-provided field resolver.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Fields of the parent type this resolver reads from the parent value, as a selection
    /// (`"id"`, `"id author { id }"`). They are added to every delegated request that
    /// selects the parent type.
    fn requires(&self) -> Option<&str> {
        None
    }

    async fn resolve(&self, context: &ResolveContext<'_>) -> Result<Resolution, Error>;
}

/// Computes the concrete object type of a value of an abstract type, for values without a
/// `__typename`.
#[derive(Clone)]
pub struct TypeResolver(Arc<dyn Fn(&Object) -> Option<String> + Send + Sync>);

impl TypeResolver {
    pub fn new(resolve: impl Fn(&Object) -> Option<String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(resolve))
    }

    pub(crate) fn resolve(&self, value: &Object) -> Option<String> {
        (self.0)(value)
    }
}

impl fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeResolver").finish_non_exhaustive()
    }
}

/// A root field of a subschema to delegate to from a custom resolver.
#[derive(Clone, Debug)]
pub struct DelegationTarget {
    subschema: String,
    operation_type: OperationType,
    field_name: Name,
    arguments: Option<Object>,
}

impl DelegationTarget {
    /// Targets `field_name`, forwarding the arguments of the field being resolved.
    pub fn new(subschema: impl Into<String>, operation_type: OperationType, field_name: Name) -> Self {
        Self {
            subschema: subschema.into(),
            operation_type,
            field_name,
            arguments: None,
        }
    }

    /// Calls the target with these argument values instead.
    pub fn with_arguments(mut self, arguments: Object) -> Self {
        self.arguments = Some(arguments);
        self
    }
}

/// What a [`Resolver`] knows about the field it resolves.
pub struct ResolveContext<'a> {
    pub(crate) scope: &'a RequestScope<'a>,
    pub(crate) field: &'a PendingField,
}

impl ResolveContext<'_> {
    /// The parent value; `None` for root fields.
    pub fn parent(&self) -> Option<&ProxiedResult> {
        self.field.parent.as_ref()
    }

    /// The parent value as a JSON object.
    pub fn parent_object(&self) -> Option<&Object> {
        self.parent()?.data()?.as_object()
    }

    /// Argument values of the field, variables substituted and defaults applied.
    pub fn arguments(&self) -> &Object {
        &self.field.arguments
    }

    /// Path of the field in the merged response.
    pub fn path(&self) -> &Path {
        &self.field.path
    }

    pub fn field_name(&self) -> &str {
        self.field.field_name.as_str()
    }

    pub fn parent_type(&self) -> &str {
        &self.field.parent_type
    }

    /// A resolution to a plain value.
    pub fn value(&self, value: Value) -> Resolution {
        Resolution::Defined(ProxiedResult::from_value(value, self.field.path.clone()))
    }

    /// Delegates the selections of this field to `target`, and checks the result.
    pub async fn delegate(&self, target: DelegationTarget) -> Result<ProxiedResult, Error> {
        let result = self.delegate_raw(&target).await?;
        check_result_and_handle_errors(result, Some(self.field.response_key.as_str()))
    }

    async fn delegate_raw(&self, target: &DelegationTarget) -> Result<ProxiedResult, Error> {
        let subschema = self
            .scope
            .merged
            .subschemas
            .get(target.subschema.as_str())
            .ok_or_else(|| {
                DelegationError::UnknownSubschema {
                    subschema: target.subschema.clone(),
                }
                .to_graphql_error(Some(self.field.path.clone()))
            })?;
        let context = DelegationContext {
            subschema,
            document: self.scope.document,
            variable_definitions: &self.scope.operation.variables,
            variables: self.scope.variables,
            path: self.field.path.clone(),
            required_selections: &self.scope.merged.required_selections,
        };
        Ok(delegate_to_schema(
            &context,
            target.operation_type,
            &target.field_name,
            &self.field.fields,
            target.arguments.as_ref(),
        )
        .await)
    }

    /// Delegates the field itself: a root field of the same name, arguments forwarded.
    ///
    /// Not defined when the subschema answered without the field and without errors.
    async fn delegate_field(&self, subschema: &str) -> Result<Resolution, Error> {
        let operation_type = match self.field.parent {
            None => self.scope.operation.operation_type,
            Some(_) => OperationType::Query,
        };
        let target = DelegationTarget::new(subschema, operation_type, self.field.field_name.clone());
        let result = self.delegate_raw(&target).await?;
        let key = self.field.response_key.as_str();
        if result.extract_key(key).data().is_none() && !result.has_errors() {
            return Ok(Resolution::NotDefined);
        }
        check_result_and_handle_errors(result, Some(key)).map(Resolution::Defined)
    }
}

/// Runs `resolver` for the field of `context`.
pub(crate) fn run_resolver<'a>(
    resolver: &'a FieldResolver,
    context: &'a ResolveContext<'a>,
) -> BoxFuture<'a, Result<Resolution, Error>> {
    async move {
        match resolver {
            FieldResolver::Delegate { subschema } => context.delegate_field(subschema).await,
            FieldResolver::Proxied => Ok(match context.parent() {
                Some(parent) => {
                    let value = parent.extract_key(context.field.response_key.as_str());
                    if value.data().is_some() {
                        Resolution::Defined(value)
                    } else {
                        Resolution::NotDefined
                    }
                }
                None => Resolution::NotDefined,
            }),
            FieldResolver::Custom(resolver) => resolver.resolve(context).await,
            FieldResolver::Chain(resolvers) => {
                for resolver in resolvers {
                    match run_resolver(resolver, context).await? {
                        Resolution::NotDefined => continue,
                        defined => return Ok(defined),
                    }
                }
                Ok(Resolution::NotDefined)
            }
        }
    }
    .boxed()
}
