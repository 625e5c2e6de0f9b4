use apollo_compiler::Schema;
use apollo_compiler::schema::ExtendedType;
use apollo_stitching::heal_schema;
use pretty_assertions::assert_eq;

#[test]
fn emptied_types_and_their_references_are_removed() {
    let mut schema = Schema::parse_and_validate(
        r#"
        type Query { me: User, posts: [Post], comment(on: PostFilter): String }
        type User { name: String, posts: [Post], favorite: Post! }
        type Post { title: String }
        input PostFilter { title: String }
        "#,
        "schema.graphql",
    )
    .unwrap()
    .into_inner();
    if let Some(ExtendedType::Object(post)) = schema.types.get_mut("Post") {
        post.make_mut().fields.clear();
    }

    heal_schema(&mut schema);

    assert!(!schema.types.contains_key("Post"));
    assert!(schema.type_field("Query", "posts").is_err());
    assert!(schema.type_field("User", "posts").is_err());
    assert!(schema.type_field("User", "favorite").is_err());
    assert!(schema.type_field("User", "name").is_ok());
    assert!(schema.validate().is_ok());
}

#[test]
fn healing_twice_changes_nothing() {
    let mut schema = Schema::parse_and_validate(
        r#"
        type Query { me: User }
        type User { name: String, best: Friend }
        type Friend { since: Int }
        "#,
        "schema.graphql",
    )
    .unwrap()
    .into_inner();
    if let Some(ExtendedType::Object(friend)) = schema.types.get_mut("Friend") {
        friend.make_mut().fields.clear();
    }

    let healed = heal_schema(&mut schema).to_string();
    let again = heal_schema(&mut schema).to_string();

    assert_eq!(healed, again);
    assert!(!healed.contains("Friend"));
}
