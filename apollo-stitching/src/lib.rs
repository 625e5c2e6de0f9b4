//! GraphQL schema stitching.
//!
//! Independent GraphQL schemas, each with its own [`Executor`], are merged into one
//! [`MergedSchema`]. Requests against the merged schema are answered by delegating each root
//! field to the subschemas that define it, and custom [`Resolver`]s can join data across them.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use apollo_compiler::Schema;
//! # use apollo_stitching::*;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Arc::new(Schema::parse_and_validate("type Query { hello: String }", "hello.graphql").map_err(|e| e.errors.to_string())?);
//! let executor = LocalExecutor::new(schema.clone(), Default::default());
//! let hello = Subschema::new("hello", (*schema).clone(), Arc::new(executor))?;
//!
//! let merged = merge_schemas(vec![hello], MergeOptions::default())?;
//! let response = merged
//!     .execute(graphql::Request::builder().query("{ hello }").build())
//!     .await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![deny(rustdoc::broken_intra_doc_links)]

#[macro_use]
pub mod json_ext;

mod check_result;
pub mod config;
mod delegate;
pub mod error;
mod execution;
pub mod executor;
pub mod graphql;
mod heal;
mod merge;
mod proxied_result;
mod relocate;
mod subschema;
pub mod transforms;

pub use check_result::check_result_and_handle_errors;
pub use config::ConflictStrategy;
pub use config::MergeOptions;
pub use error::ConfigurationError;
pub use error::DelegationError;
pub use executor::Executor;
pub use executor::LocalExecutor;
pub use executor::ServiceExecutor;
pub use heal::heal_schema;
pub use merge::DelegationTarget;
pub use merge::FieldResolver;
pub use merge::MergedSchema;
pub use merge::Resolution;
pub use merge::ResolveContext;
pub use merge::Resolver;
pub use merge::TypeResolver;
pub use merge::merge_schemas;
pub use proxied_result::ProxiedResult;
pub use relocate::Relocatable;
pub use relocate::relocated_error;
pub use subschema::Subschema;
