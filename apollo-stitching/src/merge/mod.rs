//! Building a merged schema out of subschemas.

mod resolvers;
mod type_merging;

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast::OperationType;
use apollo_compiler::executable::FieldSet;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::validation::Valid;
use async_trait::async_trait;
use indexmap::IndexMap;
use tower::BoxError;

pub use self::resolvers::DelegationTarget;
pub use self::resolvers::FieldResolver;
pub use self::resolvers::Resolution;
pub use self::resolvers::ResolveContext;
pub use self::resolvers::Resolver;
pub use self::resolvers::TypeResolver;
pub(crate) use self::resolvers::run_resolver;
use self::type_merging::MergedTypes;
use self::type_merging::field_signature;
use self::type_merging::merge_types;
use self::type_merging::root_type_name;
use crate::config::MergeOptions;
use crate::delegate::RequiredSelections;
use crate::error::ConfigurationError;
use crate::execution;
use crate::executor::Executor;
use crate::graphql;
use crate::heal::heal_schema;
use crate::subschema::Subschema;

/// The state shared by every request to a merged schema.
pub(crate) struct MergedInner {
    pub(crate) schema: Valid<Schema>,
    pub(crate) subschemas: IndexMap<String, Subschema>,
    /// By type name, then field name. Fields without an entry read their value from the
    /// parent.
    pub(crate) resolvers: HashMap<String, HashMap<String, FieldResolver>>,
    pub(crate) required_selections: RequiredSelections,
    pub(crate) type_resolvers: HashMap<String, TypeResolver>,
}

impl MergedInner {
    pub(crate) fn field_resolver(&self, type_name: &str, field_name: &str) -> Option<&FieldResolver> {
        self.resolvers.get(type_name)?.get(field_name)
    }
}

/// A schema made of several subschemas, executing each request by delegating its fields to
/// the subschemas that define them.
///
/// Cloning is cheap. A merged schema is itself an [`Executor`] and can be registered as the
/// subschema of another merge.
#[derive(Clone)]
pub struct MergedSchema {
    inner: Arc<MergedInner>,
}

#[buildstructor::buildstructor]
impl MergedSchema {
    /// Merges `subschemas`, in registration order.
    ///
    /// * `type_extensions`: SDL extending the merged types (`extend type User { ... }`) or
    ///   adding new ones. Fields it adds to types of a subschema need a resolver.
    /// * `resolvers`: by `"Type.field"`, replacing the default resolver of the field.
    /// * `type_resolvers`: by abstract type name, for values without a `__typename`.
    #[builder(visibility = "pub")]
    fn new(
        subschemas: Vec<Subschema>,
        type_extensions: Option<String>,
        resolvers: HashMap<String, FieldResolver>,
        type_resolvers: HashMap<String, TypeResolver>,
        options: Option<MergeOptions>,
    ) -> Result<Self, ConfigurationError> {
        let inner = merge(
            subschemas,
            type_extensions.as_deref(),
            resolvers,
            type_resolvers,
            &options.unwrap_or_default(),
        )?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// The merged schema, as exposed to clients.
    pub fn schema(&self) -> &Valid<Schema> {
        &self.inner.schema
    }

    pub fn subschemas(&self) -> impl Iterator<Item = &Subschema> {
        self.inner.subschemas.values()
    }

    pub fn field_resolver(&self, type_name: &str, field_name: &str) -> Option<&FieldResolver> {
        self.inner.field_resolver(type_name, field_name)
    }

    /// Executes a request. Errors are reported in the response, which is never a failure.
    pub async fn execute(&self, request: graphql::Request) -> graphql::Response {
        execution::execute(&self.inner, request).await
    }

    /// This merged schema, as a subschema of another merge.
    pub fn as_subschema(&self, name: impl Into<String>) -> Result<Subschema, ConfigurationError> {
        Subschema::new(name, self.schema().clone(), Arc::new(self.clone()))
    }
}

#[async_trait]
impl Executor for MergedSchema {
    async fn execute(&self, request: graphql::Request) -> Result<graphql::Response, BoxError> {
        Ok(MergedSchema::execute(self, request).await)
    }
}

/// The definition of a root field in the schema a subschema exposes.
fn root_field<'s>(
    subschema: &'s Subschema,
    operation_type: OperationType,
    field_name: &Name,
) -> Option<&'s Component<FieldDefinition>> {
    let schema = subschema.exposed_schema();
    schema
        .get_object(schema.root_operation(operation_type)?)?
        .fields
        .get(field_name)
}

/// Merges `subschemas` with their default resolvers only.
pub fn merge_schemas(
    subschemas: Vec<Subschema>,
    options: MergeOptions,
) -> Result<MergedSchema, ConfigurationError> {
    MergedSchema::builder()
        .subschemas(subschemas)
        .options(options)
        .build()
}

#[tracing::instrument(skip_all, fields(subschemas = subschemas.len()))]
fn merge(
    subschemas: Vec<Subschema>,
    type_extensions: Option<&str>,
    user_resolvers: HashMap<String, FieldResolver>,
    type_resolvers: HashMap<String, TypeResolver>,
    options: &MergeOptions,
) -> Result<MergedInner, ConfigurationError> {
    let mut by_name = IndexMap::with_capacity(subschemas.len());
    for subschema in subschemas {
        let name = subschema.name().to_string();
        if by_name.contains_key(&name) {
            return Err(ConfigurationError::DuplicateSubschema { subschema: name });
        }
        by_name.insert(name, subschema);
    }
    let registered = by_name.values().cloned().collect::<Vec<_>>();
    let MergedTypes {
        schema,
        root_fields,
        provided_fields,
        type_owners,
    } = merge_types(&registered, options)?;

    let mut schema = match type_extensions {
        Some(extensions) => Schema::parse(format!("{schema}\n{extensions}"), "extensions.graphql")
            .map_err(|e| ConfigurationError::InvalidTypeExtensions {
                message: e.errors.to_string(),
            })?,
        None => schema,
    };
    heal_schema(&mut schema);
    let schema = schema
        .validate()
        .map_err(|e| ConfigurationError::InvalidMergedSchema {
            message: e.errors.to_string(),
        })?;

    let mut resolvers: HashMap<String, HashMap<String, FieldResolver>> = HashMap::new();
    for ((operation_type, field_name), providers) in root_fields {
        let root = root_type_name(operation_type);
        let Ok(kept) = schema.type_field(&root, &field_name) else {
            continue;
        };
        // only subschemas defining the kept signature serve the field
        let kept = field_signature(kept);
        let mut delegates = providers
            .into_iter()
            .filter(|provider| {
                by_name
                    .get(provider)
                    .and_then(|subschema| root_field(subschema, operation_type, &field_name))
                    .is_some_and(|field| field_signature(field) == kept)
            })
            .map(FieldResolver::delegate)
            .collect::<Vec<_>>();
        let resolver = if delegates.len() == 1 {
            delegates.remove(0)
        } else {
            FieldResolver::chain(delegates)
        };
        resolvers
            .entry(root.to_string())
            .or_default()
            .insert(field_name.to_string(), resolver);
    }

    for (coordinate, resolver) in user_resolvers {
        let Some((type_name, field_name)) = coordinate.split_once('.') else {
            return Err(ConfigurationError::UnknownResolverTarget {
                type_name: coordinate,
                field_name: String::new(),
            });
        };
        if schema.type_field(type_name, field_name).is_err() {
            return Err(ConfigurationError::UnknownResolverTarget {
                type_name: type_name.to_string(),
                field_name: field_name.to_string(),
            });
        }
        tracing::debug!(%type_name, %field_name, ?resolver, "registering resolver");
        resolvers
            .entry(type_name.to_string())
            .or_default()
            .insert(field_name.to_string(), resolver);
    }

    // fields added by extensions to a subschema type have no value in the parent
    for (type_name, ty) in &schema.types {
        let ExtendedType::Object(object) = ty else {
            continue;
        };
        if ty.is_built_in() || !type_owners.contains_key(type_name) {
            continue;
        }
        for field_name in object.fields.keys() {
            let provided = provided_fields.contains(&(type_name.clone(), field_name.clone()));
            let resolved = resolvers
                .get(type_name.as_str())
                .is_some_and(|fields| fields.contains_key(field_name.as_str()));
            if !provided && !resolved {
                return Err(ConfigurationError::MissingFieldResolver {
                    type_name: type_name.to_string(),
                    field_name: field_name.to_string(),
                });
            }
        }
    }

    let mut required_selections = RequiredSelections::default();
    for (type_name, fields) in &resolvers {
        let Some((type_name, _)) = schema.types.get_key_value(type_name.as_str()) else {
            continue;
        };
        for (field_name, resolver) in fields {
            for requirement in resolver.requirements() {
                let field_set = FieldSet::parse_and_validate(
                    &schema,
                    type_name.clone(),
                    requirement,
                    "requires.graphql",
                )
                .map_err(|e| ConfigurationError::InvalidRequiredSelection {
                    type_name: type_name.to_string(),
                    field_name: field_name.clone(),
                    message: e.errors.to_string(),
                })?;
                required_selections
                    .entry(type_name.clone())
                    .or_default()
                    .push(field_set.into_inner().selection_set);
            }
        }
    }

    if options.validate_resolve_type {
        for (type_name, ty) in &schema.types {
            let is_abstract = ty.is_interface() || ty.is_union();
            if is_abstract
                && !ty.is_built_in()
                && !type_owners.contains_key(type_name)
                && !type_resolvers.contains_key(type_name.as_str())
            {
                return Err(ConfigurationError::MissingResolveType {
                    type_name: type_name.to_string(),
                });
            }
        }
    }

    if let Some(subscription) = schema.root_operation(OperationType::Subscription) {
        tracing::debug!(%subscription, "subscription root is exposed but not executable");
    }
    tracing::info!(
        subschemas = by_name.len(),
        types = schema.types.len(),
        "merged schema"
    );

    Ok(MergedInner {
        schema,
        subschemas: by_name,
        resolvers,
        required_selections,
        type_resolvers,
    })
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json_bytes::json;

    use super::*;
    use crate::config::ConflictStrategy;
    use crate::executor::LocalExecutor;

    fn local(name: &str, sdl: &str, data: serde_json_bytes::Value) -> Subschema {
        let schema = Arc::new(Schema::parse_and_validate(sdl, format!("{name}.graphql")).unwrap());
        let data = data.as_object().cloned().unwrap_or_default();
        let executor = LocalExecutor::new(schema.clone(), data);
        Subschema::new(name, (*schema).clone(), Arc::new(executor)).unwrap()
    }

    fn users() -> Subschema {
        local(
            "users",
            "type Query { me: User } type User { id: ID! name: String }",
            json!({"me": {"id": "1", "name": "Ada"}}),
        )
    }

    fn posts() -> Subschema {
        local(
            "posts",
            "type Query { latest: Post } type Post { id: ID! title: String }",
            json!({"latest": {"id": "p1", "title": "Hello"}}),
        )
    }

    #[test]
    fn merges_types_and_assigns_root_resolvers() {
        let merged = merge_schemas(vec![users(), posts()], MergeOptions::default()).unwrap();
        assert_snapshot!(merged.schema().to_string(), @r###"
        type Query {
          me: User
          latest: Post
        }

        type User {
          id: ID!
          name: String
        }

        type Post {
          id: ID!
          title: String
        }
        "###);
        assert!(matches!(
            merged.field_resolver("Query", "me"),
            Some(FieldResolver::Delegate { subschema }) if subschema == "users"
        ));
        assert!(merged.field_resolver("User", "name").is_none());
    }

    #[test]
    fn root_fields_of_several_subschemas_are_chained() {
        let other = local(
            "other",
            "type Query { me: User } type User { id: ID! }",
            json!({}),
        );
        let merged = merge_schemas(vec![users(), other], MergeOptions::default()).unwrap();
        let Some(FieldResolver::Chain(chain)) = merged.field_resolver("Query", "me") else {
            panic!("expected a chain");
        };
        let names = chain
            .iter()
            .flat_map(FieldResolver::subschemas)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["users", "other"]);
    }

    #[test]
    fn duplicate_subschemas_are_rejected() {
        let error = merge_schemas(vec![users(), users()], MergeOptions::default())
            .err()
            .unwrap();
        assert_eq!(
            error,
            ConfigurationError::DuplicateSubschema {
                subschema: "users".to_string()
            }
        );
    }

    #[test]
    fn extension_fields_need_a_resolver() {
        let error = MergedSchema::builder()
            .subschema(users())
            .subschema(posts())
            .type_extensions("extend type User { posts: [Post] }")
            .build()
            .err()
            .unwrap();
        assert_eq!(
            error.to_string(),
            "field 'User.posts' is not provided by any subschema and has no resolver"
        );
    }

    #[test]
    fn resolvers_must_target_merged_fields() {
        let error = MergedSchema::builder()
            .subschema(users())
            .resolver("User.age", FieldResolver::delegate("users"))
            .build()
            .err()
            .unwrap();
        assert_eq!(
            error,
            ConfigurationError::UnknownResolverTarget {
                type_name: "User".to_string(),
                field_name: "age".to_string()
            }
        );
    }

    #[test]
    fn invalid_extensions_are_reported() {
        let error = MergedSchema::builder()
            .subschema(users())
            .type_extensions("extend type User {")
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            error,
            ConfigurationError::InvalidTypeExtensions { .. }
        ));
    }

    #[test]
    fn abstract_types_from_extensions_need_a_type_resolver() {
        let builder = || {
            MergedSchema::builder()
                .subschema(users())
                .subschema(posts())
                .type_extensions("union SearchResult = User | Post")
        };
        assert_eq!(
            builder().build().err().unwrap(),
            ConfigurationError::MissingResolveType {
                type_name: "SearchResult".to_string()
            }
        );
        assert!(
            builder()
                .type_resolver("SearchResult", TypeResolver::new(|_| None))
                .build()
                .is_ok()
        );
        assert!(
            builder()
                .options(MergeOptions::builder().validate_resolve_type(false).build())
                .build()
                .is_ok()
        );
    }

    struct Greeting;

    #[async_trait]
    impl Resolver for Greeting {
        fn requires(&self) -> Option<&str> {
            Some("name")
        }

        async fn resolve(&self, context: &ResolveContext<'_>) -> Result<Resolution, graphql::Error> {
            let name = context
                .parent_object()
                .and_then(|parent| parent.get("name"))
                .and_then(|name| name.as_str())
                .unwrap_or("stranger");
            Ok(context.value(format!("Hello, {name}").into()))
        }
    }

    #[test]
    fn invalid_required_selections_are_rejected() {
        struct Broken;

        #[async_trait]
        impl Resolver for Broken {
            fn requires(&self) -> Option<&str> {
                Some("nickname")
            }

            async fn resolve(&self, _: &ResolveContext<'_>) -> Result<Resolution, graphql::Error> {
                Ok(Resolution::NotDefined)
            }
        }

        let error = MergedSchema::builder()
            .subschema(users())
            .type_extensions("extend type User { greeting: String }")
            .resolver("User.greeting", FieldResolver::custom(Broken))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            error,
            ConfigurationError::InvalidRequiredSelection { ref type_name, ref field_name, .. }
                if type_name == "User" && field_name == "greeting"
        ));
    }

    #[tokio::test]
    async fn custom_resolvers_read_their_required_fields() {
        let merged = MergedSchema::builder()
            .subschema(users())
            .type_extensions("extend type User { greeting: String }")
            .resolver("User.greeting", FieldResolver::custom(Greeting))
            .build()
            .unwrap();
        let response = merged
            .execute(
                graphql::Request::builder()
                    .query("{ me { greeting } }")
                    .build(),
            )
            .await;
        assert_eq!(
            serde_json_bytes::to_value(&response).unwrap(),
            json!({"data": {"me": {"greeting": "Hello, Ada"}}})
        );
    }

    #[rstest]
    #[case::first_wins(ConflictStrategy::FirstWins, "Int", json!({"count": 1}))]
    #[case::last_wins(ConflictStrategy::LastWins, "String", json!({"count": "1"}))]
    #[tokio::test]
    async fn conflicting_root_fields_are_served_by_the_kept_definition(
        #[case] strategy: ConflictStrategy,
        #[case] kept_type: &str,
        #[case] data: serde_json_bytes::Value,
    ) {
        let ints = local("ints", "type Query { count: Int }", json!({"count": 1}));
        let strings = local("strings", "type Query { count: String }", json!({"count": "1"}));
        let merged = merge_schemas(
            vec![ints, strings],
            MergeOptions::builder().conflict_strategy(strategy).build(),
        )
        .unwrap();
        assert_eq!(
            merged.schema().type_field("Query", "count").unwrap().ty.to_string(),
            kept_type
        );
        assert!(matches!(
            merged.field_resolver("Query", "count"),
            Some(FieldResolver::Delegate { .. })
        ));

        let response = merged
            .execute(graphql::Request::builder().query("{ count }").build())
            .await;
        assert_eq!(
            serde_json_bytes::to_value(&response).unwrap(),
            json!({"data": data})
        );
    }
}
