use std::sync::Arc;

use apollo_compiler::ast::OperationType;
use apollo_compiler::name;
use apollo_stitching::LocalExecutor;
use apollo_stitching::MergeOptions;
use apollo_stitching::MergedSchema;
use apollo_stitching::Subschema;
use apollo_stitching::merge_schemas;
use apollo_stitching::path;
use apollo_stitching::transforms::FilterRootFields;
use apollo_stitching::transforms::HoistField;
use apollo_stitching::transforms::RenameRootFields;
use apollo_stitching::transforms::Transform;
use pretty_assertions::assert_eq;
use serde_json_bytes::Value;
use serde_json_bytes::json;

use crate::common::Recording;
use crate::common::data;
use crate::common::error_paths;
use crate::common::execute;
use crate::common::schema;

const USERS: &str = r#"
    type Query { user: User, me: User, secret: String }
    type User { name: String! profile: Profile }
    type Profile { avatar(size: Int): String! }
"#;

fn transformed(
    data: Value,
    transforms: Vec<Arc<dyn Transform>>,
) -> (MergedSchema, Recording<LocalExecutor>) {
    let schema = schema("users", USERS);
    let executor = Recording::new(LocalExecutor::new(
        Arc::new(schema.clone()),
        data.as_object().cloned().unwrap_or_default(),
    ));
    let subschema =
        Subschema::with_transforms("users", schema, Arc::new(executor.clone()), transforms)
            .unwrap();
    let merged = merge_schemas(vec![subschema], MergeOptions::default()).unwrap();
    (merged, executor)
}

#[tokio::test]
async fn renamed_root_fields_map_results_and_errors_back() {
    let rename = RenameRootFields::new(OperationType::Query).rename(name!("user"), name!("userById"));
    let (merged, executor) = transformed(json!({"user": {}}), vec![Arc::new(rename)]);
    assert!(merged.schema().type_field("Query", "userById").is_ok());
    assert!(merged.schema().type_field("Query", "user").is_err());

    let response = execute(&merged, "{ userById { name } }").await;

    assert_eq!(executor.queries(), vec!["query { user { name } }".to_string()]);
    assert_eq!(data(&response), json!({"userById": null}));
    assert_eq!(error_paths(&response), vec![path!["userById", "name"]]);
}

#[tokio::test]
async fn hoisted_fields_are_renested_and_flattened() {
    let hoist = HoistField::new(
        OperationType::Query,
        [name!("me"), name!("profile"), name!("avatar")],
        name!("avatar"),
    );
    let (merged, executor) = transformed(
        json!({"me": {"profile": {"avatar": "ada.png"}}}),
        vec![Arc::new(hoist)],
    );

    let response = execute(&merged, "{ avatar(size: 64) }").await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(data(&response), json!({"avatar": "ada.png"}));
    assert_eq!(
        executor.queries(),
        vec!["query { avatar: me { profile { avatar(size: 64) } } }".to_string()]
    );
}

#[tokio::test]
async fn errors_inside_a_hoisted_path_point_at_the_hoisted_field() {
    let hoist = HoistField::new(
        OperationType::Query,
        [name!("me"), name!("profile"), name!("avatar")],
        name!("myAvatar"),
    );
    let (merged, _) = transformed(json!({"me": {"profile": {}}}), vec![Arc::new(hoist)]);

    let response = execute(&merged, "{ myAvatar }").await;

    assert_eq!(data(&response), json!({"myAvatar": null}));
    assert_eq!(error_paths(&response), vec![path!["myAvatar"]]);
}

#[tokio::test]
async fn transforms_compose_in_registration_order() {
    let filter = FilterRootFields::new(|_, field| field != "secret");
    let rename = RenameRootFields::new(OperationType::Query).rename(name!("me"), name!("viewer"));
    let (merged, executor) = transformed(
        json!({"me": {"name": "Ada"}, "secret": "hidden"}),
        vec![Arc::new(filter), Arc::new(rename)],
    );
    assert!(merged.schema().type_field("Query", "secret").is_err());

    let response = execute(&merged, "{ viewer { name } }").await;

    assert_eq!(data(&response), json!({"viewer": {"name": "Ada"}}));
    assert_eq!(executor.queries(), vec!["query { me { name } }".to_string()]);
}
