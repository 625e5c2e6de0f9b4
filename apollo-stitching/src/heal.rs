//! Repairing a type graph after types or fields were removed from it.

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::collections::HashMap;
use apollo_compiler::collections::HashSet;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ComponentName;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;

/// Removes what can no longer be queried and the references that would dangle.
///
/// Until nothing changes:
/// * object, interface, union, enum and input object types without any field, member or
///   value are removed,
/// * fields and input fields whose type is gone are removed, as are arguments, interface
///   implementations, union members and root operations naming a removed type,
/// * types that were reachable from the root operations and are not anymore are removed.
///
/// Types that were not reachable to begin with are kept. Healing a healthy schema is a no-op.
pub fn heal_schema(schema: &mut Schema) -> &mut Schema {
    let initially_reachable = reachable_types(schema);
    loop {
        let mut changed = remove_empty_types(schema);
        changed |= remove_dangling_references(schema);
        let reachable = reachable_types(schema);
        let before = schema.types.len();
        schema.types.retain(|name, ty| {
            let orphaned =
                !ty.is_built_in() && initially_reachable.contains(name) && !reachable.contains(name);
            if orphaned {
                tracing::trace!(type_name = %name, "removing type no longer reachable");
            }
            !orphaned
        });
        changed |= schema.types.len() != before;
        if !changed {
            return schema;
        }
    }
}

/// Names of the types reachable from the root operations and directive arguments.
pub(crate) fn reachable_types(schema: &Schema) -> HashSet<Name> {
    let mut implementers: HashMap<&Name, Vec<&Name>> = HashMap::default();
    for (name, ty) in &schema.types {
        let interfaces = match ty {
            ExtendedType::Object(object) => &object.implements_interfaces,
            ExtendedType::Interface(interface) => &interface.implements_interfaces,
            _ => continue,
        };
        for interface in interfaces {
            implementers.entry(&interface.name).or_default().push(name);
        }
    }

    let definition = &schema.schema_definition;
    let mut stack: Vec<&Name> = [&definition.query, &definition.mutation, &definition.subscription]
        .into_iter()
        .flatten()
        .map(|root| &root.name)
        .collect();
    stack.extend(
        schema
            .directive_definitions
            .values()
            .flat_map(|directive| &directive.arguments)
            .map(|argument| argument.ty.inner_named_type()),
    );

    let mut visited = HashSet::default();
    while let Some(name) = stack.pop() {
        if !visited.insert(name.clone()) {
            continue;
        }
        match schema.types.get(name) {
            Some(ExtendedType::Object(object)) => {
                push_field_types(&mut stack, &object.fields);
                stack.extend(object.implements_interfaces.iter().map(|i| &i.name));
            }
            Some(ExtendedType::Interface(interface)) => {
                push_field_types(&mut stack, &interface.fields);
                stack.extend(interface.implements_interfaces.iter().map(|i| &i.name));
                stack.extend(implementers.get(name).into_iter().flatten().copied());
            }
            Some(ExtendedType::Union(union_)) => {
                stack.extend(union_.members.iter().map(|member| &member.name));
            }
            Some(ExtendedType::InputObject(input)) => {
                stack.extend(input.fields.values().map(|field| field.ty.inner_named_type()));
            }
            Some(ExtendedType::Scalar(_)) | Some(ExtendedType::Enum(_)) | None => {}
        }
    }
    visited
}

fn push_field_types<'s>(
    stack: &mut Vec<&'s Name>,
    fields: &'s IndexMap<Name, Component<FieldDefinition>>,
) {
    for field in fields.values() {
        stack.push(field.ty.inner_named_type());
        stack.extend(
            field
                .arguments
                .iter()
                .map(|argument| argument.ty.inner_named_type()),
        );
    }
}

fn is_empty(ty: &ExtendedType) -> bool {
    match ty {
        ExtendedType::Object(object) => object.fields.is_empty(),
        ExtendedType::Interface(interface) => interface.fields.is_empty(),
        ExtendedType::Union(union_) => union_.members.is_empty(),
        ExtendedType::Enum(enum_) => enum_.values.is_empty(),
        ExtendedType::InputObject(input) => input.fields.is_empty(),
        ExtendedType::Scalar(_) => false,
    }
}

fn remove_empty_types(schema: &mut Schema) -> bool {
    let before = schema.types.len();
    schema.types.retain(|name, ty| {
        let empty = !ty.is_built_in() && is_empty(ty);
        if empty {
            tracing::trace!(type_name = %name, "removing empty type");
        }
        !empty
    });
    schema.types.len() != before
}

fn remove_dangling_references(schema: &mut Schema) -> bool {
    let existing: HashSet<Name> = schema.types.keys().cloned().collect();
    let exists = |name: &Name| existing.contains(name);
    let mut changed = false;

    for ty in schema.types.values_mut() {
        match ty {
            ExtendedType::Object(object) => {
                if has_dangling_fields(&object.fields, &exists)
                    || has_dangling_names(&object.implements_interfaces, &exists)
                {
                    let object = object.make_mut();
                    prune_fields(&mut object.fields, &exists);
                    object.implements_interfaces.retain(|i| exists(&i.name));
                    changed = true;
                }
            }
            ExtendedType::Interface(interface) => {
                if has_dangling_fields(&interface.fields, &exists)
                    || has_dangling_names(&interface.implements_interfaces, &exists)
                {
                    let interface = interface.make_mut();
                    prune_fields(&mut interface.fields, &exists);
                    interface.implements_interfaces.retain(|i| exists(&i.name));
                    changed = true;
                }
            }
            ExtendedType::Union(union_) => {
                if has_dangling_names(&union_.members, &exists) {
                    union_.make_mut().members.retain(|member| exists(&member.name));
                    changed = true;
                }
            }
            ExtendedType::InputObject(input) => {
                if input
                    .fields
                    .values()
                    .any(|field| !exists(field.ty.inner_named_type()))
                {
                    input
                        .make_mut()
                        .fields
                        .retain(|_, field| exists(field.ty.inner_named_type()));
                    changed = true;
                }
            }
            ExtendedType::Scalar(_) | ExtendedType::Enum(_) => {}
        }
    }

    let definition = &schema.schema_definition;
    let dangling_root = [&definition.query, &definition.mutation, &definition.subscription]
        .into_iter()
        .flatten()
        .any(|root| !exists(&root.name));
    if dangling_root {
        let definition = schema.schema_definition.make_mut();
        for root in [
            &mut definition.query,
            &mut definition.mutation,
            &mut definition.subscription,
        ] {
            if root.as_ref().is_some_and(|root| !exists(&root.name)) {
                *root = None;
            }
        }
        changed = true;
    }
    changed
}

fn has_dangling_fields(
    fields: &IndexMap<Name, Component<FieldDefinition>>,
    exists: &impl Fn(&Name) -> bool,
) -> bool {
    fields.values().any(|field| {
        !exists(field.ty.inner_named_type())
            || field
                .arguments
                .iter()
                .any(|argument| !exists(argument.ty.inner_named_type()))
    })
}

fn has_dangling_names(names: &IndexSet<ComponentName>, exists: &impl Fn(&Name) -> bool) -> bool {
    names.iter().any(|name| !exists(&name.name))
}

fn prune_fields(
    fields: &mut IndexMap<Name, Component<FieldDefinition>>,
    exists: &impl Fn(&Name) -> bool,
) {
    fields.retain(|name, field| {
        let keep = exists(field.ty.inner_named_type());
        if !keep {
            tracing::trace!(field = %name, "removing field of a removed type");
        }
        keep
    });
    for field in fields.values_mut() {
        if field
            .arguments
            .iter()
            .any(|argument| !exists(argument.ty.inner_named_type()))
        {
            field
                .make_mut()
                .arguments
                .retain(|argument| exists(argument.ty.inner_named_type()));
        }
    }
}
