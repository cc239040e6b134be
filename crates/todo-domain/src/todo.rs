use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Todo レコードの ID
///
/// ストアが作成時に採番する不透明な識別子。ULID を使うため辞書順は作成順と一致する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(String);

impl TodoId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn timestamp_ms(&self) -> Option<u64> {
        Ulid::from_string(&self.0)
            .ok()
            .map(|ulid| ulid.timestamp_ms())
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 所有ユーザーの ID（ID プロバイダが発行する文字列）
///
/// 空文字列も表現できる。空の扱いはストア側の契約で決まる。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: TodoId,
    pub text: String,
    pub completed: bool,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Todo {
    /// 未完了の新しいレコードを作成する。テキストの検証は行わない。
    pub fn new(text: impl Into<String>, user_id: UserId) -> Self {
        Self {
            id: TodoId::new(),
            text: text.into(),
            completed: false,
            user_id,
            created_at: Utc::now(),
        }
    }

    pub fn toggle(&mut self) {
        self.completed = !self.completed;
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}

/// `todos.get` の引数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTodosArgs {
    pub user_id: UserId,
}

/// `todos.add` の引数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTodoArgs {
    pub text: String,
    pub user_id: UserId,
}

/// `todos.toggle` / `todos.remove` の引数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoIdArgs {
    pub id: TodoId,
}
