//! Merging the type graphs of subschemas into one.

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast::OperationType;
use apollo_compiler::ast::Type;
use apollo_compiler::collections::HashMap;
use apollo_compiler::collections::HashSet;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::name;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ComponentName;
use apollo_compiler::schema::DirectiveDefinition;
use apollo_compiler::schema::EnumType;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::schema::InputObjectType;
use apollo_compiler::schema::InputValueDefinition;
use apollo_compiler::schema::InterfaceType;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::schema::UnionType;
use indexmap::map::Entry;

use crate::config::ConflictStrategy;
use crate::config::MergeOptions;
use crate::error::ConfigurationError;
use crate::subschema::Subschema;

const ROOT_OPERATIONS: [OperationType; 3] = [
    OperationType::Query,
    OperationType::Mutation,
    OperationType::Subscription,
];

/// The merged type graph and where its parts came from.
#[derive(Debug)]
pub(crate) struct MergedTypes {
    pub(crate) schema: Schema,
    /// Subschemas providing each root field, in registration order.
    pub(crate) root_fields: IndexMap<(OperationType, Name), Vec<String>>,
    /// `(type, field)` pairs defined by at least one subschema.
    pub(crate) provided_fields: HashSet<(Name, Name)>,
    /// The first subschema defining each type.
    pub(crate) type_owners: HashMap<Name, String>,
}

pub(crate) fn merge_types(
    subschemas: &[Subschema],
    options: &MergeOptions,
) -> Result<MergedTypes, ConfigurationError> {
    let mut merger = Merger {
        strategy: options.conflict_strategy,
        merged: MergedTypes {
            schema: Schema::new(),
            root_fields: IndexMap::default(),
            provided_fields: HashSet::default(),
            type_owners: HashMap::default(),
        },
        field_owners: HashMap::default(),
    };
    for subschema in subschemas {
        merger.merge_subschema(subschema)?;
    }
    Ok(merger.merged)
}

/// The canonical name of a root operation type in the merged schema.
pub(crate) fn root_type_name(operation_type: OperationType) -> Name {
    match operation_type {
        OperationType::Query => name!("Query"),
        OperationType::Mutation => name!("Mutation"),
        OperationType::Subscription => name!("Subscription"),
    }
}

struct Merger {
    strategy: ConflictStrategy,
    merged: MergedTypes,
    /// The subschema whose definition of `(type, field)` is in the merged schema.
    field_owners: FieldOwners,
}

type FieldOwners = HashMap<(Name, Name), String>;

impl Merger {
    fn merge_subschema(&mut self, subschema: &Subschema) -> Result<(), ConfigurationError> {
        let schema = subschema.exposed_schema();
        let name = subschema.name();

        // subschema root types are merged into the canonical ones
        let mut renames: HashMap<&Name, Name> = HashMap::default();
        for operation_type in ROOT_OPERATIONS {
            let Some(root) = schema.root_operation(operation_type) else {
                continue;
            };
            let canonical = root_type_name(operation_type);
            let definition = self.merged.schema.schema_definition.make_mut();
            let slot = match operation_type {
                OperationType::Query => &mut definition.query,
                OperationType::Mutation => &mut definition.mutation,
                OperationType::Subscription => &mut definition.subscription,
            };
            slot.get_or_insert_with(|| ComponentName::from(canonical.clone()));
            if let Some(object) = schema.get_object(root) {
                for field_name in object.fields.keys() {
                    self.merged
                        .root_fields
                        .entry((operation_type, field_name.clone()))
                        .or_default()
                        .push(name.to_string());
                }
            }
            renames.insert(root, canonical);
        }

        for (type_name, ty) in &schema.types {
            if ty.is_built_in() {
                continue;
            }
            let type_name = renames.get(type_name).unwrap_or(type_name).clone();
            self.check_kind(name, &type_name, ty)?;
            match ty {
                ExtendedType::Object(object) => self.merge_object_type(name, type_name, object),
                ExtendedType::Interface(interface) => {
                    self.merge_interface_type(name, type_name, interface)
                }
                ExtendedType::Union(union_) => self.merge_union_type(type_name, union_),
                ExtendedType::Enum(enum_) => self.merge_enum_type(type_name, enum_),
                ExtendedType::InputObject(input) => {
                    self.merge_input_object_type(name, type_name, input)
                }
                ExtendedType::Scalar(scalar) => {
                    // first definition wins
                    self.merged
                        .schema
                        .types
                        .entry(type_name)
                        .or_insert_with(|| ExtendedType::Scalar(scalar.clone()));
                }
            }
        }

        for (directive_name, directive) in &schema.directive_definitions {
            if !directive.is_built_in() {
                self.merge_directive(name, directive_name, directive);
            }
        }
        Ok(())
    }

    /// Fails when `type_name` was merged before as a different kind of type.
    fn check_kind(
        &mut self,
        subschema: &str,
        type_name: &Name,
        ty: &ExtendedType,
    ) -> Result<(), ConfigurationError> {
        let Some(existing) = self.merged.schema.types.get(type_name) else {
            self.merged
                .type_owners
                .insert(type_name.clone(), subschema.to_string());
            return Ok(());
        };
        if kind(existing) == kind(ty) {
            return Ok(());
        }
        Err(ConfigurationError::ConflictingTypeKinds {
            type_name: type_name.to_string(),
            first_subschema: self
                .merged
                .type_owners
                .get(type_name)
                .cloned()
                .unwrap_or_default(),
            first_kind: kind(existing),
            second_subschema: subschema.to_string(),
            second_kind: kind(ty),
        })
    }

    fn merge_object_type(&mut self, subschema: &str, object_name: Name, object: &Node<ObjectType>) {
        for field_name in object.fields.keys() {
            self.merged
                .provided_fields
                .insert((object_name.clone(), field_name.clone()));
        }
        let existing = self
            .merged
            .schema
            .types
            .entry(object_name.clone())
            .or_insert_with(|| {
                let mut copy = ObjectType::clone(object);
                copy.name = object_name.clone();
                copy.fields.clear();
                ExtendedType::Object(Node::new(copy))
            });
        if let ExtendedType::Object(existing) = existing {
            let existing = existing.make_mut();
            existing
                .implements_interfaces
                .extend(object.implements_interfaces.iter().cloned());
            merge_fields(
                self.strategy,
                subschema,
                &object_name,
                &mut existing.fields,
                &object.fields,
                &mut self.field_owners,
            );
        }
    }

    fn merge_interface_type(
        &mut self,
        subschema: &str,
        interface_name: Name,
        interface: &Node<InterfaceType>,
    ) {
        for field_name in interface.fields.keys() {
            self.merged
                .provided_fields
                .insert((interface_name.clone(), field_name.clone()));
        }
        let existing = self
            .merged
            .schema
            .types
            .entry(interface_name.clone())
            .or_insert_with(|| {
                let mut copy = InterfaceType::clone(interface);
                copy.fields.clear();
                ExtendedType::Interface(Node::new(copy))
            });
        if let ExtendedType::Interface(existing) = existing {
            let existing = existing.make_mut();
            existing
                .implements_interfaces
                .extend(interface.implements_interfaces.iter().cloned());
            merge_fields(
                self.strategy,
                subschema,
                &interface_name,
                &mut existing.fields,
                &interface.fields,
                &mut self.field_owners,
            );
        }
    }

    fn merge_union_type(&mut self, union_name: Name, union_: &Node<UnionType>) {
        let existing = self
            .merged
            .schema
            .types
            .entry(union_name)
            .or_insert_with(|| ExtendedType::Union(union_.clone()));
        if let ExtendedType::Union(existing) = existing {
            // IndexSet::extend deduplicates
            existing
                .make_mut()
                .members
                .extend(union_.members.iter().cloned());
        }
    }

    fn merge_enum_type(&mut self, enum_name: Name, enum_: &Node<EnumType>) {
        let existing = self
            .merged
            .schema
            .types
            .entry(enum_name)
            .or_insert_with(|| ExtendedType::Enum(enum_.clone()));
        if let ExtendedType::Enum(existing) = existing {
            for (value_name, value) in &enum_.values {
                if !existing.values.contains_key(value_name) {
                    existing
                        .make_mut()
                        .values
                        .insert(value_name.clone(), value.clone());
                }
            }
        }
    }

    fn merge_input_object_type(
        &mut self,
        subschema: &str,
        input_name: Name,
        input: &Node<InputObjectType>,
    ) {
        let strategy = self.strategy;
        let existing = self
            .merged
            .schema
            .types
            .entry(input_name.clone())
            .or_insert_with(|| ExtendedType::InputObject(input.clone()));
        let ExtendedType::InputObject(existing) = existing else {
            return;
        };
        let owners = &mut self.field_owners;
        for (field_name, field) in &input.fields {
            let coordinate = (input_name.clone(), field_name.clone());
            match existing.make_mut().fields.entry(field_name.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(field.clone());
                    owners.insert(coordinate, subschema.to_string());
                }
                Entry::Occupied(mut entry) => {
                    if input_signature(entry.get()) != input_signature(field) {
                        conflict_hint(strategy, owners.get(&coordinate), subschema, &coordinate);
                        if strategy == ConflictStrategy::LastWins {
                            entry.insert(field.clone());
                            owners.insert(coordinate, subschema.to_string());
                        }
                    }
                }
            }
        }
    }

    fn merge_directive(
        &mut self,
        subschema: &str,
        directive_name: &Name,
        directive: &Node<DirectiveDefinition>,
    ) {
        match self
            .merged
            .schema
            .directive_definitions
            .entry(directive_name.clone())
        {
            Entry::Vacant(entry) => {
                entry.insert(directive.clone());
            }
            Entry::Occupied(mut entry) => {
                if directive_signature(entry.get()) != directive_signature(directive) {
                    tracing::warn!(
                        directive = %directive_name,
                        %subschema,
                        strategy = ?self.strategy,
                        "directive is defined differently by several subschemas"
                    );
                    if self.strategy == ConflictStrategy::LastWins {
                        entry.insert(directive.clone());
                    }
                }
            }
        }
    }
}

fn merge_fields(
    strategy: ConflictStrategy,
    subschema: &str,
    type_name: &Name,
    merged: &mut IndexMap<Name, Component<FieldDefinition>>,
    fields: &IndexMap<Name, Component<FieldDefinition>>,
    owners: &mut FieldOwners,
) {
    for (field_name, field) in fields {
        let coordinate = (type_name.clone(), field_name.clone());
        match merged.entry(field_name.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(field.clone());
                owners.insert(coordinate, subschema.to_string());
            }
            Entry::Occupied(mut entry) => {
                if field_signature(entry.get()) != field_signature(field) {
                    conflict_hint(strategy, owners.get(&coordinate), subschema, &coordinate);
                    if strategy == ConflictStrategy::LastWins {
                        entry.insert(field.clone());
                        owners.insert(coordinate, subschema.to_string());
                    }
                }
            }
        }
    }
}

fn conflict_hint(
    strategy: ConflictStrategy,
    kept: Option<&String>,
    subschema: &str,
    (type_name, field_name): &(Name, Name),
) {
    tracing::warn!(
        %type_name,
        field = %field_name,
        first_subschema = kept.map_or("", String::as_str),
        second_subschema = %subschema,
        ?strategy,
        "field is defined differently by several subschemas"
    );
}

pub(crate) fn field_signature(field: &FieldDefinition) -> (&Type, Vec<(&Name, &Type)>) {
    (
        &field.ty,
        field
            .arguments
            .iter()
            .map(|argument| (&argument.name, argument.ty.as_ref()))
            .collect(),
    )
}

fn input_signature(field: &InputValueDefinition) -> &Type {
    &field.ty
}

fn directive_signature(directive: &DirectiveDefinition) -> (Vec<(&Name, &Type)>, bool) {
    (
        directive
            .arguments
            .iter()
            .map(|argument| (&argument.name, argument.ty.as_ref()))
            .collect(),
        directive.repeatable,
    )
}

fn kind(ty: &ExtendedType) -> &'static str {
    match ty {
        ExtendedType::Scalar(_) => "a scalar",
        ExtendedType::Object(_) => "an object",
        ExtendedType::Interface(_) => "an interface",
        ExtendedType::Union(_) => "a union",
        ExtendedType::Enum(_) => "an enum",
        ExtendedType::InputObject(_) => "an input object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use apollo_compiler::validation::Valid;
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::executor::LocalExecutor;

    fn subschema(name: &str, sdl: &str) -> Subschema {
        let schema = Arc::new(Schema::parse_and_validate(sdl, format!("{name}.graphql")).unwrap());
        let executor = LocalExecutor::new(schema.clone(), Default::default());
        Subschema::new(name, (*schema).clone(), Arc::new(executor)).unwrap()
    }

    #[test]
    fn unions_fields_interfaces_and_members() {
        let merged = merge_types(
            &[
                subschema(
                    "users",
                    r#"
                    type Query { user(id: ID!): User }
                    interface Node { id: ID! }
                    type User implements Node { id: ID! name: String }
                    union Actor = User
                    enum Role { ADMIN }
                    "#,
                ),
                subschema(
                    "reviews",
                    r#"
                    schema { query: RootQuery }
                    type RootQuery { reviews: [Review] user(id: ID!): User }
                    type User { id: ID! reviews: [Review] }
                    type Review { body: String }
                    union Actor = Review
                    enum Role { EDITOR }
                    "#,
                ),
            ],
            &MergeOptions::default(),
        )
        .unwrap();

        assert_snapshot!(merged.schema.to_string(), @r###"
        type Query {
          user(id: ID!): User
          reviews: [Review]
        }

        interface Node {
          id: ID!
        }

        type User implements Node {
          id: ID!
          name: String
          reviews: [Review]
        }

        union Actor = User | Review

        enum Role {
          ADMIN
          EDITOR
        }

        type Review {
          body: String
        }
        "###);
        assert_eq!(
            merged.root_fields[&(OperationType::Query, name!("user"))],
            vec!["users".to_string(), "reviews".to_string()]
        );
        assert!(!merged.schema.types.contains_key("RootQuery"));
        assert_eq!(merged.type_owners["Review"], "reviews");
    }

    #[test]
    fn conflicting_kinds_name_both_subschemas() {
        let error = merge_types(
            &[
                subschema("a", "type Query { a: Thing } type Thing { id: ID }"),
                subschema("b", "type Query { b: Thing } interface Thing { id: ID }"),
            ],
            &MergeOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            error.to_string(),
            "type 'Thing' is an object in subschema 'a' but an interface in subschema 'b'"
        );
    }

    #[test]
    fn conflict_strategy_picks_the_field_definition() {
        let subschemas = [
            subschema("a", "type Query { count: Int }"),
            subschema("b", "type Query { count: String }"),
        ];
        let first = merge_types(&subschemas, &MergeOptions::default()).unwrap();
        assert_eq!(
            first.schema.type_field("Query", "count").unwrap().ty.to_string(),
            "Int"
        );

        let options = MergeOptions::builder()
            .conflict_strategy(ConflictStrategy::LastWins)
            .build();
        let last = merge_types(&subschemas, &options).unwrap();
        assert_eq!(
            last.schema.type_field("Query", "count").unwrap().ty.to_string(),
            "String"
        );
    }
}
