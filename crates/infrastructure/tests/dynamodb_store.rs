//! DynamoDB Local に対する結合テスト
//!
//! 環境変数 DYNAMODB_ENDPOINT が無い場合はスキップする。

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::{Credentials, SharedCredentialsProvider};
use infrastructure::{DynamoDbClient, DynamoDbTodoStore, TodoRepository, TodoStore};
use std::sync::Arc;
use todo_domain::{AddTodoArgs, GetTodosArgs, TodoError, TodoId, TodoIdArgs, UserId};

const TABLE_NAME: &str = "todo-demo-test";

async fn setup_store() -> Option<DynamoDbTodoStore> {
    let Ok(endpoint) = std::env::var("DYNAMODB_ENDPOINT") else {
        eprintln!("DYNAMODB_ENDPOINT not set, skipping test");
        return None;
    };

    let config = aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(&endpoint)
        .region("us-east-1")
        .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
            "test", "test", None, None, "test",
        )))
        .load()
        .await;

    let db = DynamoDbClient::from_client(aws_sdk_dynamodb::Client::new(&config), TABLE_NAME);
    if let Err(e) = db.ensure_table().await {
        eprintln!("DynamoDB Local not available ({e}), skipping test");
        return None;
    }

    Some(DynamoDbTodoStore::new(db))
}

/// テストごとに衝突しないユーザー ID
fn unique_user() -> UserId {
    UserId::new(format!("test-user-{}", TodoId::new()))
}

#[tokio::test]
async fn test_add_toggle_remove_lifecycle() {
    let Some(store) = setup_store().await else {
        return;
    };
    let user = unique_user();

    // 作成
    store
        .add(AddTodoArgs {
            text: "Buy milk".to_string(),
            user_id: user.clone(),
        })
        .await
        .unwrap();
    let todos = store
        .get(GetTodosArgs {
            user_id: user.clone(),
        })
        .await
        .unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].text, "Buy milk");
    assert!(!todos[0].completed);
    assert_eq!(todos[0].user_id, user);

    // toggle は自己逆
    let id = todos[0].id.clone();
    store.toggle(TodoIdArgs { id: id.clone() }).await.unwrap();
    store.toggle(TodoIdArgs { id: id.clone() }).await.unwrap();
    let todos = store
        .get(GetTodosArgs {
            user_id: user.clone(),
        })
        .await
        .unwrap();
    assert!(!todos[0].completed);

    // 削除後は NotFound
    store.remove(TodoIdArgs { id: id.clone() }).await.unwrap();
    assert_eq!(
        store.toggle(TodoIdArgs { id: id.clone() }).await.unwrap_err(),
        TodoError::NotFound(id.to_string())
    );
    assert_eq!(
        store.remove(TodoIdArgs { id: id.clone() }).await.unwrap_err(),
        TodoError::NotFound(id.to_string())
    );
}

#[tokio::test]
async fn test_users_are_isolated() {
    let Some(store) = setup_store().await else {
        return;
    };
    let repository = TodoRepository::new(Arc::new(store));
    let (u1, u2) = (unique_user(), unique_user());

    repository.add("Mine", &u1).await.unwrap();
    repository.add("Theirs", &u2).await.unwrap();

    let mine = repository.list(&u1).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(mine.iter().all(|todo| todo.is_owned_by(&u1)));
    assert!(repository.list(&UserId::new("")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_user_is_rejected() {
    let Some(store) = setup_store().await else {
        return;
    };

    let err = store
        .add(AddTodoArgs {
            text: "Buy milk".to_string(),
            user_id: UserId::new(""),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TodoError::Validation(_)));
}
