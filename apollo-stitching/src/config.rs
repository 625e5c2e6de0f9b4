//! Merge configuration.

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

fn default_true() -> bool {
    true
}

/// Which definition is kept when subschemas define the same field, input field, enum value
/// or directive differently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// The definition of the first registered subschema wins.
    #[default]
    FirstWins,
    /// The definition of the last registered subschema wins.
    LastWins,
}

/// Options of a schema merge
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct MergeOptions {
    /// How conflicting definitions of the same member are reconciled; defaults to `first_wins`
    pub conflict_strategy: ConflictStrategy,

    /// Fail the merge when an abstract type has no way to resolve its concrete type; defaults
    /// to true
    #[serde(default = "default_true")]
    pub validate_resolve_type: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            conflict_strategy: ConflictStrategy::default(),
            validate_resolve_type: default_true(),
        }
    }
}

#[buildstructor::buildstructor]
impl MergeOptions {
    #[builder(visibility = "pub")]
    fn new(conflict_strategy: Option<ConflictStrategy>, validate_resolve_type: Option<bool>) -> Self {
        Self {
            conflict_strategy: conflict_strategy.unwrap_or_default(),
            validate_resolve_type: validate_resolve_type.unwrap_or_else(default_true),
        }
    }
}
