// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use assert_matches::assert_matches;
use async_graphql::{Request, Response, Variables};
use serde_json::{json, Value};

use crate::{
    build_schema,
    database::{Database, DatabaseError},
    models::{CreateProfileInput, CreateUserInput, EntityId, MemberTypeId},
    ServiceSchema,
};

const CREATE_USER: &str =
    "mutation($dto: CreateUserInput!) { createUser(dto: $dto) { id name balance } }";
const CREATE_POST: &str =
    "mutation($dto: CreatePostInput!) { createPost(dto: $dto) { id title content authorId } }";
const CREATE_PROFILE: &str = "mutation($dto: CreateProfileInput!) { \
     createProfile(dto: $dto) { id isMale yearOfBirth userId memberType { id } } }";
const CHANGE_PROFILE: &str = "mutation($id: UUID!, $dto: ChangeProfileInput!) { \
     changeProfile(id: $id, dto: $dto) { id isMale yearOfBirth memberType { id } } }";
const DELETE_POST: &str = "mutation($id: UUID!) { deletePost(id: $id) }";
const SUBSCRIBE: &str = "mutation($userId: UUID!, $authorId: UUID!) { \
     subscribeTo(userId: $userId, authorId: $authorId) }";
const UNSUBSCRIBE: &str = "mutation($userId: UUID!, $authorId: UUID!) { \
     unsubscribeFrom(userId: $userId, authorId: $authorId) }";
const USER_WITH_RELATIONS: &str = "query($id: UUID!) { user(id: $id) { \
     id name balance profile { id } posts { id } \
     userSubscribedTo { id } subscribedToUser { id } } }";
const USER_SUBSCRIPTIONS: &str = "query($id: UUID!) { user(id: $id) { \
     userSubscribedTo { id } subscribedToUser { id } } }";

async fn test_schema() -> (ServiceSchema, Arc<Database>) {
    let database = Arc::new(Database::in_memory().await.expect("in-memory database"));
    let schema = build_schema(Arc::clone(&database));
    (schema, database)
}

fn data(response: &Response) -> Value {
    serde_json::to_value(&response.data).expect("serializable response data")
}

fn with_variables(query: &str, variables: Value) -> Request {
    Request::new(query).variables(Variables::from_json(variables))
}

/// Executes a request that is expected to succeed without field errors.
async fn execute_ok(schema: &ServiceSchema, request: impl Into<Request>) -> Response {
    let response = schema.execute(request).await;
    assert!(
        response.errors.is_empty(),
        "unexpected errors: {:?}",
        response.errors
    );
    response
}

async fn create_user(schema: &ServiceSchema, name: &str, balance: f64) -> String {
    let response = execute_ok(
        schema,
        with_variables(
            CREATE_USER,
            json!({ "dto": { "name": name, "balance": balance } }),
        ),
    )
    .await;
    data(&response)["createUser"]["id"]
        .as_str()
        .expect("user id")
        .to_string()
}

async fn create_post(schema: &ServiceSchema, title: &str, content: &str, author_id: &str) -> String {
    let response = execute_ok(
        schema,
        with_variables(
            CREATE_POST,
            json!({ "dto": { "title": title, "content": content, "authorId": author_id } }),
        ),
    )
    .await;
    data(&response)["createPost"]["id"]
        .as_str()
        .expect("post id")
        .to_string()
}

#[tokio::test]
async fn member_types_are_seeded() {
    let (schema, _) = test_schema().await;
    let response = execute_ok(&schema, "{ memberTypes { id discount postsLimitPerMonth } }").await;
    assert_eq!(
        data(&response)["memberTypes"],
        json!([
            { "id": "BASIC", "discount": 0.0, "postsLimitPerMonth": 20 },
            { "id": "BUSINESS", "discount": 7.5, "postsLimitPerMonth": 100 },
        ])
    );
}

#[tokio::test]
async fn member_type_lookup_by_tier() {
    let (schema, _) = test_schema().await;
    let response = execute_ok(&schema, "{ memberType(id: BUSINESS) { id discount } }").await;
    assert_eq!(
        data(&response)["memberType"],
        json!({ "id": "BUSINESS", "discount": 7.5 })
    );
}

#[tokio::test]
async fn unknown_member_tier_is_rejected_at_validation() {
    let (schema, database) = test_schema().await;
    let response = schema.execute("{ memberType(id: GOLD) { id } }").await;
    assert!(!response.errors.is_empty());
    assert!(database.operations().read_all().await.is_empty());
}

#[tokio::test]
async fn create_user_round_trip() {
    let (schema, _) = test_schema().await;
    let id = create_user(&schema, "Alice", 12.5).await;
    let response = execute_ok(&schema, with_variables(USER_WITH_RELATIONS, json!({ "id": id }))).await;
    assert_eq!(
        data(&response)["user"],
        json!({
            "id": id,
            "name": "Alice",
            "balance": 12.5,
            "profile": null,
            "posts": [],
            "userSubscribedTo": [],
            "subscribedToUser": [],
        })
    );
}

#[tokio::test]
async fn lookup_miss_is_null_not_error() {
    let (schema, _) = test_schema().await;
    let id = EntityId::generate().to_string();
    let response = execute_ok(&schema, with_variables(USER_WITH_RELATIONS, json!({ "id": id }))).await;
    assert_eq!(data(&response)["user"], Value::Null);
}

#[tokio::test]
async fn create_post_round_trip() {
    let (schema, _) = test_schema().await;
    let author_id = create_user(&schema, "Bob", 0.0).await;
    let post_id = create_post(&schema, "t", "c", &author_id).await;
    let response = execute_ok(
        &schema,
        with_variables(
            "query($id: UUID!) { post(id: $id) { id title content authorId } }",
            json!({ "id": post_id }),
        ),
    )
    .await;
    assert_eq!(
        data(&response)["post"],
        json!({ "id": post_id, "title": "t", "content": "c", "authorId": author_id })
    );
}

#[tokio::test]
async fn change_profile_updates_only_supplied_fields() {
    let (schema, _) = test_schema().await;
    let user_id = create_user(&schema, "Carol", 3.0).await;
    let response = execute_ok(
        &schema,
        with_variables(
            CREATE_PROFILE,
            json!({ "dto": {
                "isMale": true,
                "yearOfBirth": 1988,
                "memberTypeId": "BASIC",
                "userId": user_id,
            } }),
        ),
    )
    .await;
    let profile_id = data(&response)["createProfile"]["id"]
        .as_str()
        .expect("profile id")
        .to_string();

    execute_ok(
        &schema,
        with_variables(
            CHANGE_PROFILE,
            json!({ "id": profile_id, "dto": { "yearOfBirth": 1990 } }),
        ),
    )
    .await;

    let response = execute_ok(
        &schema,
        with_variables(
            "query($id: UUID!) { profile(id: $id) { isMale yearOfBirth memberType { id } } }",
            json!({ "id": profile_id }),
        ),
    )
    .await;
    assert_eq!(
        data(&response)["profile"],
        json!({ "isMale": true, "yearOfBirth": 1990, "memberType": { "id": "BASIC" } })
    );
}

#[tokio::test]
async fn change_missing_user_fails_with_opaque_error() {
    let (schema, _) = test_schema().await;
    let id = EntityId::generate().to_string();
    let response = schema
        .execute(with_variables(
            "mutation($id: UUID!, $dto: ChangeUserInput!) { changeUser(id: $id, dto: $dto) { id } }",
            json!({ "id": id, "dto": { "name": "nobody" } }),
        ))
        .await;
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        format!("Error changing user with id: {id}")
    );
}

#[tokio::test]
async fn delete_post_is_not_idempotent() {
    let (schema, _) = test_schema().await;
    let author_id = create_user(&schema, "Dave", 0.0).await;
    let post_id = create_post(&schema, "title", "content", &author_id).await;

    let response = execute_ok(&schema, with_variables(DELETE_POST, json!({ "id": post_id }))).await;
    assert_eq!(
        data(&response)["deletePost"],
        json!(format!("Post with id: {post_id} was successfully deleted."))
    );

    let response = schema
        .execute(with_variables(DELETE_POST, json!({ "id": post_id })))
        .await;
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        format!("Error deleting post with id: {post_id}")
    );
}

#[tokio::test]
async fn failed_delete_does_not_abort_sibling_fields() {
    let (schema, _) = test_schema().await;
    let author_id = create_user(&schema, "Erin", 0.0).await;
    let post_id = create_post(&schema, "title", "content", &author_id).await;
    let missing_id = EntityId::generate().to_string();

    let response = schema
        .execute(with_variables(
            "mutation($first: UUID!, $second: UUID!) { \
                 first: deletePost(id: $first) second: deletePost(id: $second) }",
            json!({ "first": post_id, "second": missing_id }),
        ))
        .await;
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        format!("Error deleting post with id: {missing_id}")
    );

    // The first sibling still ran: the post is gone.
    let response = execute_ok(
        &schema,
        with_variables(
            "query($id: UUID!) { post(id: $id) { id } }",
            json!({ "id": post_id }),
        ),
    )
    .await;
    assert_eq!(data(&response)["post"], Value::Null);
}

#[tokio::test]
async fn duplicate_subscription_fails() {
    let (schema, _) = test_schema().await;
    let user_id = create_user(&schema, "Frank", 0.0).await;
    let author_id = create_user(&schema, "Grace", 0.0).await;

    let variables = json!({ "userId": user_id, "authorId": author_id });
    let response = execute_ok(&schema, with_variables(SUBSCRIBE, variables.clone())).await;
    assert_eq!(
        data(&response)["subscribeTo"],
        json!(format!(
            "User with id: {user_id} successfully subscribed to the user with id: {author_id}"
        ))
    );

    let response = schema.execute(with_variables(SUBSCRIBE, variables)).await;
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        format!("Error subscribing to user with id: {author_id}")
    );
}

#[tokio::test]
async fn subscription_directions_are_symmetric() {
    let (schema, _) = test_schema().await;
    let user_id = create_user(&schema, "Heidi", 0.0).await;
    let author_id = create_user(&schema, "Ivan", 0.0).await;
    execute_ok(
        &schema,
        with_variables(SUBSCRIBE, json!({ "userId": user_id, "authorId": author_id })),
    )
    .await;

    let response = execute_ok(
        &schema,
        with_variables(USER_SUBSCRIPTIONS, json!({ "id": user_id })),
    )
    .await;
    assert_eq!(
        data(&response)["user"],
        json!({ "userSubscribedTo": [{ "id": author_id }], "subscribedToUser": [] })
    );

    let response = execute_ok(
        &schema,
        with_variables(USER_SUBSCRIPTIONS, json!({ "id": author_id })),
    )
    .await;
    assert_eq!(
        data(&response)["user"],
        json!({ "userSubscribedTo": [], "subscribedToUser": [{ "id": user_id }] })
    );
}

#[tokio::test]
async fn unsubscribe_removes_the_edge() {
    let (schema, _) = test_schema().await;
    let user_id = create_user(&schema, "Judy", 0.0).await;
    let author_id = create_user(&schema, "Mallory", 0.0).await;
    let variables = json!({ "userId": user_id, "authorId": author_id });

    execute_ok(&schema, with_variables(SUBSCRIBE, variables.clone())).await;
    let response = execute_ok(&schema, with_variables(UNSUBSCRIBE, variables.clone())).await;
    assert_eq!(
        data(&response)["unsubscribeFrom"],
        json!(format!(
            "User with id: {user_id} successfully unsubscribed from the user with id: {author_id}"
        ))
    );

    let response = execute_ok(
        &schema,
        with_variables(USER_SUBSCRIPTIONS, json!({ "id": user_id })),
    )
    .await;
    assert_eq!(data(&response)["user"]["userSubscribedTo"], json!([]));

    // Repeating the unsubscribe fails: the edge is already gone.
    let response = schema.execute(with_variables(UNSUBSCRIBE, variables)).await;
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        format!("Error unsubscribing from user with id: {author_id}")
    );
}

#[tokio::test]
async fn deep_documents_are_rejected_before_execution() {
    let (schema, database) = test_schema().await;
    let response = schema
        .execute(
            "{ users { userSubscribedTo { userSubscribedTo { userSubscribedTo { \
                 userSubscribedTo { id } } } } } }",
        )
        .await;
    assert!(!response.errors.is_empty());
    assert_eq!(data(&response), Value::Null);
    assert!(database.operations().read_all().await.is_empty());
}

#[tokio::test]
async fn documents_at_the_depth_limit_execute() {
    let (schema, _) = test_schema().await;
    execute_ok(
        &schema,
        "{ users { userSubscribedTo { userSubscribedTo { userSubscribedTo { id } } } } }",
    )
    .await;
}

#[tokio::test]
async fn malformed_uuid_variable_never_reaches_a_resolver() {
    let (schema, database) = test_schema().await;
    let response = schema
        .execute(with_variables(
            USER_WITH_RELATIONS,
            json!({ "id": "not-a-uuid" }),
        ))
        .await;
    assert!(!response.errors.is_empty());
    assert!(database.operations().read_all().await.is_empty());
}

#[tokio::test]
async fn malformed_uuid_literal_never_reaches_a_resolver() {
    let (schema, database) = test_schema().await;
    let response = schema.execute("{ user(id: \"42\") { id } }").await;
    assert!(!response.errors.is_empty());
    assert!(database.operations().read_all().await.is_empty());
}

#[tokio::test]
async fn reads_are_idempotent() {
    let (schema, _) = test_schema().await;
    let user_id = create_user(&schema, "Niaj", 7.0).await;
    create_post(&schema, "a", "b", &user_id).await;

    let query = "{ users { id name balance posts { id title } } }";
    let first = execute_ok(&schema, query).await;
    let second = execute_ok(&schema, query).await;
    assert_eq!(data(&first), data(&second));
}

#[tokio::test]
async fn stats_reports_recorded_operations() {
    let (schema, _) = test_schema().await;
    let user_id = create_user(&schema, "Olivia", 1.0).await;
    execute_ok(
        &schema,
        with_variables(
            "query($id: UUID!) { user(id: $id) { id name } }",
            json!({ "id": user_id }),
        ),
    )
    .await;

    let response = execute_ok(&schema, "{ stats { operationHistory { model operation args } } }").await;
    let history = data(&response)["stats"]["operationHistory"].clone();
    assert_eq!(history[0]["model"], "User");
    assert_eq!(history[0]["operation"], "create");
    assert!(history[0]["args"]
        .as_str()
        .expect("serialized args")
        .contains("Olivia"));
    assert_eq!(history[1]["model"], "User");
    assert_eq!(history[1]["operation"], "findUnique");
    assert_eq!(history.as_array().expect("history array").len(), 2);
}

#[tokio::test]
async fn deleting_a_user_cascades_to_its_relations() {
    let (schema, _) = test_schema().await;
    let author_id = create_user(&schema, "Peggy", 0.0).await;
    let subscriber_id = create_user(&schema, "Rupert", 0.0).await;
    create_post(&schema, "title", "content", &author_id).await;
    execute_ok(
        &schema,
        with_variables(
            CREATE_PROFILE,
            json!({ "dto": {
                "isMale": false,
                "yearOfBirth": 1970,
                "memberTypeId": "BUSINESS",
                "userId": author_id,
            } }),
        ),
    )
    .await;
    execute_ok(
        &schema,
        with_variables(
            SUBSCRIBE,
            json!({ "userId": subscriber_id, "authorId": author_id }),
        ),
    )
    .await;

    execute_ok(
        &schema,
        with_variables(
            "mutation($id: UUID!) { deleteUser(id: $id) }",
            json!({ "id": author_id }),
        ),
    )
    .await;

    let response = execute_ok(&schema, "{ posts { id } profiles { id } }").await;
    assert_eq!(data(&response)["posts"], json!([]));
    assert_eq!(data(&response)["profiles"], json!([]));

    let response = execute_ok(
        &schema,
        with_variables(USER_SUBSCRIPTIONS, json!({ "id": subscriber_id })),
    )
    .await;
    assert_eq!(data(&response)["user"]["userSubscribedTo"], json!([]));
}

#[tokio::test]
async fn file_backed_database_bootstrap() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let path = temp_dir.path().join("data").join("sociograph.sqlite");
    let database = Database::open(&path).await.expect("open database");
    assert_eq!(database.member_types().await.expect("member types").len(), 2);
}

#[tokio::test]
async fn deleting_a_missing_user_is_not_found() {
    let database = Database::in_memory().await.expect("in-memory database");
    let err = database
        .delete_user(EntityId::generate())
        .await
        .expect_err("missing user");
    assert_matches!(err, DatabaseError::NotFound);
}

#[tokio::test]
async fn a_second_profile_for_the_same_user_is_rejected() {
    let database = Database::in_memory().await.expect("in-memory database");
    let user = database
        .create_user(CreateUserInput {
            name: "Sybil".to_string(),
            balance: 0.0,
        })
        .await
        .expect("create user");

    let dto = CreateProfileInput {
        is_male: false,
        year_of_birth: 2001,
        member_type_id: MemberTypeId::Basic,
        user_id: user.id,
    };
    database
        .create_profile(dto.clone())
        .await
        .expect("first profile");
    let err = database
        .create_profile(dto)
        .await
        .expect_err("unique user_id");
    assert_matches!(err, DatabaseError::Sqlite(_));
}
