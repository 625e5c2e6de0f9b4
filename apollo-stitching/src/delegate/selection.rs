//! Selection set rewrites applied to every delegated request.

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::collections::HashMap;
use apollo_compiler::collections::HashSet;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::InlineFragment;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::name;
use apollo_compiler::schema::ExtendedType;

/// Selections that resolvers of the merged schema need on their parent values, by type.
pub(crate) type RequiredSelections = HashMap<Name, Vec<SelectionSet>>;

/// Replaces fragment spreads with inline fragments carrying the same directives.
pub(crate) fn expand_fragments(document: &ExecutableDocument, selection_set: &SelectionSet) -> SelectionSet {
    let mut expanded = SelectionSet::new(selection_set.ty.clone());
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                let mut field = field.clone();
                if !field.selection_set.is_empty() {
                    let inner = expand_fragments(document, &field.selection_set);
                    field.make_mut().selection_set = inner;
                }
                expanded.push(field);
            }
            Selection::InlineFragment(inline) => {
                let mut inline = inline.clone();
                let inner = expand_fragments(document, &inline.selection_set);
                inline.make_mut().selection_set = inner;
                expanded.push(inline);
            }
            Selection::FragmentSpread(spread) => {
                let Some(fragment) = document.fragments.get(&spread.fragment_name) else {
                    continue;
                };
                let inner = expand_fragments(document, &fragment.selection_set);
                expanded.push(
                    InlineFragment::with_type_condition(fragment.type_condition().clone())
                        .with_directives(spread.directives.iter().cloned())
                        .with_selections(inner.selections),
                );
            }
        }
    }
    expanded
}

/// Adds the selections required on the parent types found in `selection_set`, recursively.
///
/// A required field is skipped when a field with the same response key is already selected
/// at that level.
pub(crate) fn add_required_selections(selection_set: &mut SelectionSet, required: &RequiredSelections) {
    for selection in &mut selection_set.selections {
        match selection {
            Selection::Field(field) if !field.selection_set.is_empty() => {
                add_required_selections(&mut field.make_mut().selection_set, required);
            }
            Selection::InlineFragment(inline) => {
                add_required_selections(&mut inline.make_mut().selection_set, required);
            }
            Selection::Field(_) | Selection::FragmentSpread(_) => {}
        }
    }
    let Some(sets) = required.get(&selection_set.ty) else {
        return;
    };
    for set in sets {
        for field in set.fields() {
            let key = field.response_key();
            if !selection_set.fields().any(|existing| existing.response_key() == key) {
                selection_set.push(field.clone());
            }
        }
    }
}

/// Keeps only what `schema` understands.
///
/// Unknown fields and arguments are dropped, as are inline fragments on unknown types. A
/// selection set emptied by filtering selects `__typename` instead.
pub(crate) fn filter_to_schema(schema: &Schema, selection_set: &SelectionSet) -> SelectionSet {
    let mut filtered = SelectionSet::new(selection_set.ty.clone());
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                if field.name == "__typename" {
                    filtered.push(field.clone());
                    continue;
                }
                let Ok(definition) = schema.type_field(&selection_set.ty, &field.name) else {
                    tracing::trace!(
                        type_name = %selection_set.ty,
                        field = %field.name,
                        "dropping field unknown to the subschema"
                    );
                    continue;
                };
                let mut field = field.clone();
                let target = field.make_mut();
                target
                    .arguments
                    .retain(|argument| definition.argument_by_name(&argument.name).is_some());
                let is_leaf = schema
                    .types
                    .get(definition.ty.inner_named_type())
                    .is_none_or(ExtendedType::is_leaf);
                if is_leaf {
                    target.selection_set.selections.clear();
                } else {
                    let mut inner = filter_to_schema(schema, &target.selection_set);
                    if inner.is_empty() {
                        select_typename(schema, &mut inner);
                    }
                    target.selection_set = inner;
                }
                filtered.push(field);
            }
            Selection::InlineFragment(inline) => {
                if let Some(condition) = &inline.type_condition
                    && !schema.types.contains_key(condition)
                {
                    continue;
                }
                let inner = filter_to_schema(schema, &inline.selection_set);
                if inner.is_empty() {
                    continue;
                }
                let mut inline = inline.clone();
                inline.make_mut().selection_set = inner;
                filtered.push(inline);
            }
            // expanded into inline fragments beforehand
            Selection::FragmentSpread(_) => {}
        }
    }
    filtered
}

/// Selects `__typename` in every selection set of an interface or union type, so the
/// concrete type of each delegated object is known.
pub(crate) fn add_typename_to_abstract(schema: &Schema, selection_set: &mut SelectionSet) {
    for selection in &mut selection_set.selections {
        match selection {
            Selection::Field(field) if !field.selection_set.is_empty() => {
                add_typename_to_abstract(schema, &mut field.make_mut().selection_set);
            }
            Selection::InlineFragment(inline) => {
                add_typename_to_abstract(schema, &mut inline.make_mut().selection_set);
            }
            Selection::Field(_) | Selection::FragmentSpread(_) => {}
        }
    }
    let is_abstract = schema
        .types
        .get(&selection_set.ty)
        .is_some_and(|ty| ty.is_interface() || ty.is_union());
    let has_typename = selection_set
        .fields()
        .any(|field| field.alias.is_none() && field.name == "__typename");
    if is_abstract && !has_typename {
        select_typename(schema, selection_set);
    }
}

fn select_typename(schema: &Schema, selection_set: &mut SelectionSet) {
    if let Ok(field) = selection_set.new_field(schema, name!("__typename")) {
        selection_set.push(field);
    }
}

/// Names of the variables referenced by `field`, its directives and its selections.
pub(crate) fn used_variables(field: &Field) -> HashSet<Name> {
    let mut used = HashSet::default();
    collect_field_variables(field, &mut used);
    used
}

fn collect_field_variables(field: &Field, used: &mut HashSet<Name>) {
    for argument in &field.arguments {
        collect_value_variables(&argument.value, used);
    }
    collect_directive_variables(&field.directives, used);
    collect_selection_variables(&field.selection_set, used);
}

fn collect_selection_variables(selection_set: &SelectionSet, used: &mut HashSet<Name>) {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => collect_field_variables(field, used),
            Selection::InlineFragment(inline) => {
                collect_directive_variables(&inline.directives, used);
                collect_selection_variables(&inline.selection_set, used);
            }
            Selection::FragmentSpread(spread) => {
                collect_directive_variables(&spread.directives, used)
            }
        }
    }
}

fn collect_directive_variables(directives: &ast::DirectiveList, used: &mut HashSet<Name>) {
    for directive in directives.iter() {
        for argument in &directive.arguments {
            collect_value_variables(&argument.value, used);
        }
    }
}

fn collect_value_variables(value: &Node<ast::Value>, used: &mut HashSet<Name>) {
    match value.as_ref() {
        ast::Value::Variable(name) => {
            used.insert(name.clone());
        }
        ast::Value::List(items) => {
            for item in items {
                collect_value_variables(item, used);
            }
        }
        ast::Value::Object(fields) => {
            for (_, value) in fields {
                collect_value_variables(value, used);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::validation::Valid;
    use pretty_assertions::assert_eq;

    use super::*;

    const MERGED: &str = r#"
        type Query { user(id: ID!): User, node(id: ID!): Node }
        interface Node { id: ID! }
        type User implements Node { id: ID!, name: String, posts(first: Int): [Post], rating: Int }
        type Post implements Node { id: ID!, title: String }
    "#;

    fn parse(sdl: &str) -> Valid<Schema> {
        Schema::parse_and_validate(sdl, "schema.graphql").unwrap()
    }

    fn root_field(schema: &Valid<Schema>, query: &str) -> (Valid<ExecutableDocument>, SelectionSet) {
        let document = ExecutableDocument::parse_and_validate(schema, query, "query.graphql").unwrap();
        let operation = document.operations.get(None).unwrap();
        let field = operation.selection_set.fields().next().unwrap();
        let expanded = expand_fragments(&document, &field.selection_set);
        (document, expanded)
    }

    #[test]
    fn fragments_become_inline_fragments() {
        let schema = parse(MERGED);
        let (_, expanded) = root_field(
            &schema,
            r#"query { user(id: "1") { ...UserFields } } fragment UserFields on User { name }"#,
        );
        assert_eq!(expanded.serialize().no_indent().to_string(), "{ ... on User { name } }");
    }

    #[test]
    fn unknown_fields_and_arguments_are_dropped() {
        let merged = parse(MERGED);
        let subschema = parse(
            r#"
            type Query { user(id: ID!): User }
            type User { id: ID!, posts: [Post] }
            type Post { title: String }
            "#,
        );
        let (_, expanded) = root_field(
            &merged,
            r#"{ user(id: "1") { name posts(first: 2) { title } rating } }"#,
        );
        let filtered = filter_to_schema(&subschema, &expanded);
        assert_eq!(
            filtered.serialize().no_indent().to_string(),
            "{ posts { title } }"
        );

        let (_, expanded) = root_field(&merged, r#"{ user(id: "1") { name rating } }"#);
        assert!(filter_to_schema(&subschema, &expanded).is_empty());
    }

    #[test]
    fn emptied_nested_sets_select_typename() {
        let merged = parse(MERGED);
        let subschema = parse(
            r#"
            type Query { user(id: ID!): User }
            type User { id: ID!, posts: [Post] }
            type Post { id: ID! }
            "#,
        );
        let (_, expanded) = root_field(&merged, r#"{ user(id: "1") { posts { title } } }"#);
        let filtered = filter_to_schema(&subschema, &expanded);
        assert_eq!(
            filtered.serialize().no_indent().to_string(),
            "{ posts { __typename } }"
        );
    }

    #[test]
    fn abstract_selections_get_typename() {
        let schema = parse(MERGED);
        let document = ExecutableDocument::parse_and_validate(
            &schema,
            r#"{ node(id: "1") { id ... on User { posts { id } } } }"#,
            "query.graphql",
        )
        .unwrap();
        let operation = document.operations.get(None).unwrap();
        let mut selection_set = operation.selection_set.clone();
        add_typename_to_abstract(&schema, &mut selection_set);
        assert_eq!(
            selection_set.serialize().no_indent().to_string(),
            r#"{ node(id: "1") { id ... on User { posts { id } } __typename } }"#
        );
    }

    #[test]
    fn required_selections_are_added_once() {
        let schema = parse(MERGED);
        let (_, mut expanded) = root_field(&schema, r#"{ user(id: "1") { id name } }"#);
        let mut required = RequiredSelections::default();
        let id_and_rating = apollo_compiler::executable::FieldSet::parse_and_validate(
            &schema,
            name!("User"),
            "id rating",
            "requires.graphql",
        )
        .unwrap();
        required.insert(name!("User"), vec![id_and_rating.into_inner().selection_set]);
        add_required_selections(&mut expanded, &required);
        assert_eq!(
            expanded.serialize().no_indent().to_string(),
            "{ id name rating }"
        );
    }

    #[test]
    fn variables_in_arguments_and_directives_are_found() {
        let schema = parse(MERGED);
        let document = ExecutableDocument::parse_and_validate(
            &schema,
            "query($id: ID!, $first: Int, $withName: Boolean!) {
                user(id: $id) { name @include(if: $withName) posts(first: $first) { title } }
            }",
            "query.graphql",
        )
        .unwrap();
        let operation = document.operations.get(None).unwrap();
        let field = operation.selection_set.fields().next().unwrap();
        let used = used_variables(field);
        let mut used = used.iter().map(|name| name.as_str()).collect::<Vec<_>>();
        used.sort();
        assert_eq!(used, vec!["first", "id", "withName"]);
    }
}
