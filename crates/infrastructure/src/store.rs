use async_trait::async_trait;
use todo_domain::{AddTodoArgs, GetTodosArgs, Todo, TodoIdArgs, TodoResult, UserId};
use tokio::sync::broadcast;

/// ストアから配信される変更通知
///
/// `user_id` が分かる場合はそのユーザーのライブクエリだけが再取得される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub user_id: Option<UserId>,
}

impl ChangeNotice {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    /// 所有者が分からない変更。全ての購読者が再取得する
    pub fn everyone() -> Self {
        Self { user_id: None }
    }

    pub fn concerns(&self, user_id: &UserId) -> bool {
        self.user_id.as_ref().map_or(true, |owner| owner == user_id)
    }
}

/// リモートストアの 4 つの関数（`todos.get` / `add` / `toggle` / `remove`）
///
/// 各実装は引数レコードを受け取り、結果を返すかエラーを送出するだけで、
/// リトライや冪等化は行わない。
#[async_trait]
pub trait TodoStore: Send + Sync + 'static {
    /// 指定ユーザーのレコードをストア定義の順序で返す。空の userId には空配列を返す
    async fn get(&self, args: GetTodosArgs) -> TodoResult<Vec<Todo>>;

    /// レコードを 1 件作成する。空の userId は Validation エラー
    async fn add(&self, args: AddTodoArgs) -> TodoResult<()>;

    async fn toggle(&self, args: TodoIdArgs) -> TodoResult<()>;

    async fn remove(&self, args: TodoIdArgs) -> TodoResult<()>;

    /// 変更をプッシュできるストアは通知チャネルを返す
    fn changes(&self) -> Option<broadcast::Receiver<ChangeNotice>> {
        None
    }
}
