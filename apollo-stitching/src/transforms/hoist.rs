use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast::OperationType;
use apollo_compiler::ast::Type;
use apollo_compiler::executable;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::validation::Valid;
use serde_json_bytes::ByteString;

use super::DelegatedRequest;
use super::Transform;
use crate::error::DelegationError;
use crate::graphql;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// Exposes a nested field of a root field as a root field of its own.
///
/// `HoistField::new(OperationType::Query, [user, profile, avatar], userAvatar)` adds
/// `userAvatar` to the root type, with the arguments and type of `User.profile.avatar`.
/// Requests for it are sent as `userAvatar: user { profile { avatar } }`. The intermediate
/// fields are selected without arguments and may be null, so the hoisted field is nullable.
#[derive(Clone, Debug)]
pub struct HoistField {
    operation_type: OperationType,
    path: Vec<Name>,
    new_field_name: Name,
}

impl HoistField {
    pub fn new(
        operation_type: OperationType,
        path: impl IntoIterator<Item = Name>,
        new_field_name: Name,
    ) -> Self {
        Self {
            operation_type,
            path: path.into_iter().collect(),
            new_field_name,
        }
    }

    fn applies_to(&self, request: &DelegatedRequest) -> bool {
        self.path.len() > 1
            && request.operation_type == self.operation_type
            && request.root_field.name == self.new_field_name
    }

    /// The definitions of the fields along the path, starting at the root type.
    fn definitions<'s>(
        &self,
        schema: &'s Schema,
    ) -> Result<Vec<&'s Component<FieldDefinition>>, String> {
        let mut type_name = schema
            .root_operation(self.operation_type)
            .ok_or_else(|| format!("no {} root type", self.operation_type))?;
        let mut definitions = Vec::with_capacity(self.path.len());
        for field_name in &self.path {
            let definition = schema
                .type_field(type_name, field_name)
                .map_err(|_| format!("no field '{field_name}' on type '{type_name}'"))?;
            type_name = definition.ty.inner_named_type();
            definitions.push(definition);
        }
        Ok(definitions)
    }
}

impl Transform for HoistField {
    fn transform_schema(&self, schema: &mut Schema) {
        if self.path.len() < 2 {
            return;
        }
        let hoisted = match self.definitions(schema) {
            Ok(definitions) => definitions.last().map(|definition| {
                let mut definition = FieldDefinition::clone(definition);
                definition.name = self.new_field_name.clone();
                definition.ty = nullable(definition.ty);
                definition
            }),
            Err(reason) => {
                tracing::warn!(field = %self.new_field_name, %reason, "cannot hoist field");
                None
            }
        };
        let Some(hoisted) = hoisted else {
            return;
        };
        let Some(root) = schema.root_operation(self.operation_type).cloned() else {
            return;
        };
        if let Some(ExtendedType::Object(root)) = schema.types.get_mut(&root) {
            root.make_mut()
                .fields
                .insert(self.new_field_name.clone(), Component::new(hoisted));
        }
    }

    fn transform_request(
        &self,
        mut request: DelegatedRequest,
        target: &Valid<Schema>,
    ) -> Result<DelegatedRequest, DelegationError> {
        if !self.applies_to(&request) {
            return Ok(request);
        }
        let definitions = self
            .definitions(target)
            .map_err(|reason| DelegationError::InvalidTransform { reason })?;

        let hoisted = &request.root_field;
        let mut nested: Option<executable::Field> = None;
        for (field_name, definition) in self.path.iter().zip(definitions).rev() {
            let field = executable::Field::new(field_name.clone(), definition.node.clone());
            nested = Some(match nested {
                None => {
                    let mut field = field.with_arguments(hoisted.arguments.iter().cloned());
                    field.selection_set.selections = hoisted.selection_set.selections.clone();
                    field
                }
                Some(inner) => field.with_selection(inner),
            });
        }
        let Some(outer) = nested else {
            return Ok(request);
        };
        let outer = outer
            .with_alias(hoisted.response_key().clone())
            .with_directives(hoisted.directives.iter().cloned());
        request.root_field = outer;
        Ok(request)
    }

    fn transform_result(
        &self,
        mut response: graphql::Response,
        request: &DelegatedRequest,
    ) -> graphql::Response {
        if !self.applies_to(request) {
            return response;
        }
        let key = request.response_key().as_str();
        let nested = Path(
            self.path[1..]
                .iter()
                .map(|name| PathElement::Key(name.to_string()))
                .collect(),
        );
        if let Some(Value::Object(data)) = response.data.as_mut() {
            let flattened = data
                .get(key)
                .and_then(|value| value.get_path(&nested))
                .cloned()
                .unwrap_or(Value::Null);
            data.insert(ByteString::from(key), flattened);
        }

        let hoisted = Path::from_iter([key]);
        let nested = hoisted.join(&nested);
        for error in &mut response.errors {
            let Some(path) = error.path.as_mut() else {
                continue;
            };
            if let Some(rest) = path.strip_prefix(&nested) {
                *path = hoisted.join(rest);
            } else if path.starts_with(&hoisted) {
                *path = hoisted.clone();
            }
        }
        response
    }
}

fn nullable(ty: Type) -> Type {
    match ty {
        Type::NonNullNamed(name) => Type::Named(name),
        Type::NonNullList(inner) => Type::List(inner),
        ty => ty,
    }
}
