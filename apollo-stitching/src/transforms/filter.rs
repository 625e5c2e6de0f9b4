use std::fmt;

use apollo_compiler::Schema;
use apollo_compiler::ast::OperationType;
use apollo_compiler::schema::ExtendedType;

use super::Transform;

type Predicate = dyn Fn(OperationType, &str) -> bool + Send + Sync;

/// Hides the root fields for which the predicate returns `false`.
pub struct FilterRootFields {
    keep: Box<Predicate>,
}

impl FilterRootFields {
    pub fn new(keep: impl Fn(OperationType, &str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            keep: Box::new(keep),
        }
    }
}

impl fmt::Debug for FilterRootFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRootFields").finish_non_exhaustive()
    }
}

impl Transform for FilterRootFields {
    fn transform_schema(&self, schema: &mut Schema) {
        for operation_type in [
            OperationType::Query,
            OperationType::Mutation,
            OperationType::Subscription,
        ] {
            let Some(root) = schema.root_operation(operation_type).cloned() else {
                continue;
            };
            if let Some(ExtendedType::Object(root)) = schema.types.get_mut(&root) {
                root.make_mut()
                    .fields
                    .retain(|name, _| (self.keep)(operation_type, name));
            }
        }
    }
}
