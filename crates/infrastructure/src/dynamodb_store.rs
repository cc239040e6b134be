use crate::{DynamoDbClient, TodoStore, USER_INDEX};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use todo_domain::{
    AddTodoArgs, GetTodosArgs, Todo, TodoError, TodoId, TodoIdArgs, TodoResult, UserId,
};
use tracing::{debug, error, info, warn};

/// 完了フラグ反転時に値を読み直す上限回数
const MAX_TOGGLE_ATTEMPTS: u32 = 3;

/// DynamoDB をリモートストアとして使う実装
///
/// 単一テーブル設計:
/// - `PK` / `SK` = `TODO#<id>`（ID 単独での toggle / remove 用）
/// - `GSI1PK` = `USER#<userId>`, `GSI1SK` = `<id>`（ユーザー別一覧用）
#[derive(Clone)]
pub struct DynamoDbTodoStore {
    db: DynamoDbClient,
}

impl DynamoDbTodoStore {
    pub fn new(db: DynamoDbClient) -> Self {
        Self { db }
    }

    async fn read_completed(&self, id: &TodoId) -> TodoResult<bool> {
        let output = self
            .db
            .client()
            .get_item()
            .table_name(self.db.table_name())
            .key("PK", todo_key(id))
            .key("SK", todo_key(id))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| transport("get_item", e))?;

        let item = output
            .item
            .ok_or_else(|| TodoError::NotFound(id.to_string()))?;

        item.get("completed")
            .and_then(|v| v.as_bool().ok())
            .copied()
            .ok_or_else(|| TodoError::Transport(format!("Malformed todo item: {id}")))
    }
}

#[async_trait]
impl TodoStore for DynamoDbTodoStore {
    async fn get(&self, args: GetTodosArgs) -> TodoResult<Vec<Todo>> {
        if args.user_id.is_empty() {
            return Ok(Vec::new());
        }

        let mut todos = Vec::new();
        let mut exclusive_start_key = None;

        loop {
            let output = self
                .db
                .client()
                .query()
                .table_name(self.db.table_name())
                .index_name(USER_INDEX)
                .key_condition_expression("GSI1PK = :pk")
                .expression_attribute_values(":pk", user_key(&args.user_id))
                .set_exclusive_start_key(exclusive_start_key)
                .send()
                .await
                .map_err(|e| transport("query", e))?;

            for item in output.items.unwrap_or_default() {
                match item_to_todo(&item) {
                    Some(todo) if todo.is_owned_by(&args.user_id) => todos.push(todo),
                    Some(todo) => {
                        warn!(todo_id = %todo.id, "Skipping todo indexed under another user")
                    }
                    None => error!(user_id = %args.user_id, "Failed to parse todo item"),
                }
            }

            exclusive_start_key = output.last_evaluated_key;
            if exclusive_start_key.is_none() {
                break;
            }
        }

        debug!(user_id = %args.user_id, count = todos.len(), "Todos listed");
        Ok(todos)
    }

    async fn add(&self, args: AddTodoArgs) -> TodoResult<()> {
        if args.user_id.is_empty() {
            return Err(TodoError::Validation("userId cannot be empty".to_string()));
        }

        let todo = Todo::new(args.text, args.user_id);

        self.db
            .client()
            .put_item()
            .table_name(self.db.table_name())
            .set_item(Some(todo_to_item(&todo)))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await
            .map_err(|e| transport("put_item", e))?;

        info!(todo_id = %todo.id, user_id = %todo.user_id, "Todo added");
        Ok(())
    }

    async fn toggle(&self, args: TodoIdArgs) -> TodoResult<()> {
        for attempt in 1..=MAX_TOGGLE_ATTEMPTS {
            let current = self.read_completed(&args.id).await?;

            let result = self
                .db
                .client()
                .update_item()
                .table_name(self.db.table_name())
                .key("PK", todo_key(&args.id))
                .key("SK", todo_key(&args.id))
                .update_expression("SET completed = :next")
                .condition_expression("attribute_exists(PK) AND completed = :current")
                .expression_attribute_values(":next", AttributeValue::Bool(!current))
                .expression_attribute_values(":current", AttributeValue::Bool(current))
                .send()
                .await;

            match result {
                Ok(_) => {
                    info!(todo_id = %args.id, completed = !current, "Todo toggled");
                    return Ok(());
                }
                Err(e)
                    if e.as_service_error()
                        .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
                {
                    // 削除済みか、他の呼び出しが先に反転した。次の読み直しで判別する
                    debug!(todo_id = %args.id, attempt, "Toggle condition failed, re-reading");
                }
                Err(e) => return Err(transport("update_item", e)),
            }
        }

        warn!(todo_id = %args.id, "Toggle gave up after repeated conflicts");
        Err(TodoError::Conflict(args.id.to_string()))
    }

    async fn remove(&self, args: TodoIdArgs) -> TodoResult<()> {
        let result = self
            .db
            .client()
            .delete_item()
            .table_name(self.db.table_name())
            .key("PK", todo_key(&args.id))
            .key("SK", todo_key(&args.id))
            .condition_expression("attribute_exists(PK)")
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(todo_id = %args.id, "Todo removed");
                Ok(())
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                Err(TodoError::NotFound(args.id.to_string()))
            }
            Err(e) => Err(transport("delete_item", e)),
        }
    }
}

fn todo_key(id: &TodoId) -> AttributeValue {
    AttributeValue::S(format!("TODO#{id}"))
}

fn user_key(user_id: &UserId) -> AttributeValue {
    AttributeValue::S(format!("USER#{user_id}"))
}

fn transport<E, R>(operation: &str, e: SdkError<E, R>) -> TodoError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&e).to_string();
    error!(operation, error = %message, "DynamoDB operation failed");
    TodoError::Transport(message)
}

pub(crate) fn todo_to_item(todo: &Todo) -> HashMap<String, AttributeValue> {
    HashMap::from([
        ("PK".to_string(), todo_key(&todo.id)),
        ("SK".to_string(), todo_key(&todo.id)),
        ("GSI1PK".to_string(), user_key(&todo.user_id)),
        (
            "GSI1SK".to_string(),
            AttributeValue::S(todo.id.as_str().to_string()),
        ),
        (
            "EntityType".to_string(),
            AttributeValue::S("Todo".to_string()),
        ),
        (
            "id".to_string(),
            AttributeValue::S(todo.id.as_str().to_string()),
        ),
        ("text".to_string(), AttributeValue::S(todo.text.clone())),
        ("completed".to_string(), AttributeValue::Bool(todo.completed)),
        (
            "userId".to_string(),
            AttributeValue::S(todo.user_id.as_str().to_string()),
        ),
        (
            "createdAt".to_string(),
            AttributeValue::S(todo.created_at.to_rfc3339()),
        ),
    ])
}

pub(crate) fn item_to_todo(item: &HashMap<String, AttributeValue>) -> Option<Todo> {
    let created_at = item.get("createdAt")?.as_s().ok()?;

    Some(Todo {
        id: TodoId::from_string(item.get("id")?.as_s().ok()?.clone()),
        text: item.get("text")?.as_s().ok()?.clone(),
        completed: *item.get("completed")?.as_bool().ok()?,
        user_id: UserId::new(item.get("userId")?.as_s().ok()?.clone()),
        created_at: DateTime::parse_from_rfc3339(created_at)
            .ok()?
            .with_timezone(&Utc),
    })
}
