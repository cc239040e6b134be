use crate::{ChangeNotice, TodoStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use todo_domain::{
    AddTodoArgs, GetTodosArgs, Todo, TodoError, TodoId, TodoIdArgs, TodoResult, UserId,
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// ストアに届いた呼び出しの記録（テスト観測用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get { user_id: UserId },
    Add { text: String, user_id: UserId },
    Toggle { id: TodoId },
    Remove { id: TodoId },
}

/// 簡易な InMemory 実装（開発/テスト用）
///
/// ID は ULID なので `BTreeMap` の走査順がそのまま作成順になる。
/// 呼び出し履歴は `recording()` で作ったときだけ記録する。
pub struct InMemoryTodoStore {
    todos: RwLock<BTreeMap<TodoId, Todo>>,
    calls: Option<Mutex<Vec<StoreCall>>>,
    changes: broadcast::Sender<ChangeNotice>,
}

impl InMemoryTodoStore {
    pub fn new() -> Self {
        Self::with_calls(None)
    }

    /// 呼び出し履歴を記録するストア（テスト観測用）
    pub fn recording() -> Self {
        Self::with_calls(Some(Mutex::new(Vec::new())))
    }

    fn with_calls(calls: Option<Mutex<Vec<StoreCall>>>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            todos: RwLock::new(BTreeMap::new()),
            calls,
            changes,
        }
    }

    /// これまでに受け付けた呼び出しの履歴。記録していなければ空
    pub async fn calls(&self) -> Vec<StoreCall> {
        match &self.calls {
            Some(calls) => calls.lock().await.clone(),
            None => Vec::new(),
        }
    }

    pub async fn add_calls(&self) -> usize {
        self.calls()
            .await
            .iter()
            .filter(|call| matches!(call, StoreCall::Add { .. }))
            .count()
    }

    pub async fn len(&self) -> usize {
        self.todos.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.todos.read().await.is_empty()
    }

    async fn record(&self, call: StoreCall) {
        if let Some(calls) = &self.calls {
            calls.lock().await.push(call);
        }
    }

    fn notify(&self, notice: ChangeNotice) {
        // 購読者がいなければ送信は失敗するが、それで問題ない
        let _ = self.changes.send(notice);
    }
}

impl Default for InMemoryTodoStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TodoStore for InMemoryTodoStore {
    async fn get(&self, args: GetTodosArgs) -> TodoResult<Vec<Todo>> {
        self.record(StoreCall::Get {
            user_id: args.user_id.clone(),
        })
        .await;

        if args.user_id.is_empty() {
            return Ok(Vec::new());
        }

        let todos: Vec<Todo> = self
            .todos
            .read()
            .await
            .values()
            .filter(|todo| todo.is_owned_by(&args.user_id))
            .cloned()
            .collect();

        debug!(user_id = %args.user_id, count = todos.len(), "In-memory todos listed");
        Ok(todos)
    }

    async fn add(&self, args: AddTodoArgs) -> TodoResult<()> {
        self.record(StoreCall::Add {
            text: args.text.clone(),
            user_id: args.user_id.clone(),
        })
        .await;

        if args.user_id.is_empty() {
            return Err(TodoError::Validation("userId cannot be empty".to_string()));
        }

        let todo = Todo::new(args.text, args.user_id.clone());
        info!(todo_id = %todo.id, user_id = %args.user_id, "In-memory todo added");
        self.todos.write().await.insert(todo.id.clone(), todo);

        self.notify(ChangeNotice::for_user(args.user_id));
        Ok(())
    }

    async fn toggle(&self, args: TodoIdArgs) -> TodoResult<()> {
        self.record(StoreCall::Toggle {
            id: args.id.clone(),
        })
        .await;

        let owner = {
            let mut todos = self.todos.write().await;
            let todo = todos
                .get_mut(&args.id)
                .ok_or_else(|| TodoError::NotFound(args.id.to_string()))?;
            todo.toggle();
            info!(todo_id = %args.id, completed = todo.completed, "In-memory todo toggled");
            todo.user_id.clone()
        };

        self.notify(ChangeNotice::for_user(owner));
        Ok(())
    }

    async fn remove(&self, args: TodoIdArgs) -> TodoResult<()> {
        self.record(StoreCall::Remove {
            id: args.id.clone(),
        })
        .await;

        let removed = self
            .todos
            .write()
            .await
            .remove(&args.id)
            .ok_or_else(|| TodoError::NotFound(args.id.to_string()))?;
        info!(todo_id = %args.id, "In-memory todo removed");

        self.notify(ChangeNotice::for_user(removed.user_id));
        Ok(())
    }

    fn changes(&self) -> Option<broadcast::Receiver<ChangeNotice>> {
        Some(self.changes.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(user: &str) -> GetTodosArgs {
        GetTodosArgs {
            user_id: UserId::new(user),
        }
    }

    fn add(text: &str, user: &str) -> AddTodoArgs {
        AddTodoArgs {
            text: text.to_string(),
            user_id: UserId::new(user),
        }
    }

    #[tokio::test]
    async fn test_add_then_get_returns_new_incomplete_record() {
        let store = InMemoryTodoStore::new();

        store.add(add("Buy milk", "u1")).await.unwrap();
        let todos = store.get(get("u1")).await.unwrap();

        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].text, "Buy milk");
        assert!(!todos[0].completed);
        assert_eq!(todos[0].user_id, UserId::new("u1"));
    }

    #[tokio::test]
    async fn test_empty_user_id() {
        let store = InMemoryTodoStore::new();

        // 空のuserIdでの作成はValidationエラー
        let err = store.add(add("Buy milk", "")).await.unwrap_err();
        assert!(matches!(err, TodoError::Validation(_)));

        // 空のuserIdでの取得は空配列
        assert!(store.get(get("")).await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_records_are_listed_in_creation_order() {
        let store = InMemoryTodoStore::new();
        for text in ["A", "B", "C"] {
            store.add(add(text, "u1")).await.unwrap();
            // 同一ミリ秒内のULIDは乱数部で並ぶため、時刻をずらす
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let texts: Vec<String> = store
            .get(get("u1"))
            .await
            .unwrap()
            .into_iter()
            .map(|todo| todo.text)
            .collect();

        assert_eq!(texts, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_toggle_and_remove_unknown_id_are_not_found() {
        let store = InMemoryTodoStore::new();
        let id = TodoId::new();

        let err = store.toggle(TodoIdArgs { id: id.clone() }).await.unwrap_err();
        assert_eq!(err, TodoError::NotFound(id.to_string()));

        let err = store.remove(TodoIdArgs { id: id.clone() }).await.unwrap_err();
        assert_eq!(err, TodoError::NotFound(id.to_string()));
    }

    #[tokio::test]
    async fn test_mutations_push_change_notices_for_owner() {
        let store = InMemoryTodoStore::new();
        let mut changes = store.changes().unwrap();

        store.add(add("Buy milk", "u1")).await.unwrap();
        assert_eq!(
            changes.recv().await.unwrap(),
            ChangeNotice::for_user(UserId::new("u1"))
        );

        let id = store.get(get("u1")).await.unwrap()[0].id.clone();
        store.toggle(TodoIdArgs { id: id.clone() }).await.unwrap();
        store.remove(TodoIdArgs { id }).await.unwrap();

        assert!(changes.recv().await.unwrap().concerns(&UserId::new("u1")));
        assert!(changes.recv().await.unwrap().concerns(&UserId::new("u1")));
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let store = InMemoryTodoStore::recording();

        store.add(add("Buy milk", "u1")).await.unwrap();
        let _ = store.get(get("u1")).await.unwrap();

        let calls = store.calls().await;
        assert_eq!(
            calls,
            vec![
                StoreCall::Add {
                    text: "Buy milk".to_string(),
                    user_id: UserId::new("u1")
                },
                StoreCall::Get {
                    user_id: UserId::new("u1")
                },
            ]
        );
        assert_eq!(store.add_calls().await, 1);
    }

    #[tokio::test]
    async fn test_default_store_keeps_no_call_log() {
        // サーバの既定ストアはポーリングの get を溜め込まない
        let store = InMemoryTodoStore::new();
        store.add(add("Buy milk", "u1")).await.unwrap();
        for _ in 0..1_000 {
            store.get(get("u1")).await.unwrap();
        }

        assert!(store.calls().await.is_empty());
        assert_eq!(store.add_calls().await, 0);
        assert_eq!(store.len().await, 1);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn get_never_returns_other_users_records(
                owners in proptest::collection::vec(prop_oneof![Just("u1"), Just("u2"), Just("")], 0..12)
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                let (mine, theirs) = rt.block_on(async {
                    let store = InMemoryTodoStore::new();
                    for owner in &owners {
                        let _ = store.add(add("task", owner)).await;
                    }
                    (
                        store.get(get("u1")).await.unwrap(),
                        store.get(get("u2")).await.unwrap(),
                    )
                });

                prop_assert!(mine.iter().all(|todo| todo.user_id == UserId::new("u1")));
                prop_assert!(theirs.iter().all(|todo| todo.user_id == UserId::new("u2")));
                prop_assert_eq!(mine.len(), owners.iter().filter(|o| **o == "u1").count());
            }
        }
    }
}
