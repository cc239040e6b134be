use crate::{ChangeNotice, TodoStore};
use std::sync::Arc;
use std::time::Duration;
use todo_domain::{
    AddTodoArgs, GetTodosArgs, Todo, TodoError, TodoId, TodoIdArgs, TodoResult, UserId,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const LOCAL_CHANGE_CAPACITY: usize = 64;

/// ライブクエリの現在値。`None` は初回取得前（読み込み中）
pub type LiveTodos = Option<Vec<Todo>>;

/// 現在のユーザーにスコープした呼び出しをストアへ発行するバインディング
///
/// 失敗は捕捉もリトライもせず、ストアのエラーをそのまま返す。
/// クローンは同じローカル変更通知を共有するため、どのクローンから
/// 変更しても全ての購読が再取得される。
#[derive(Clone)]
pub struct TodoRepository {
    store: Arc<dyn TodoStore>,
    local_changes: broadcast::Sender<ChangeNotice>,
    poll_interval: Duration,
}

impl TodoRepository {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        let (local_changes, _) = broadcast::channel(LOCAL_CHANGE_CAPACITY);
        Self {
            store,
            local_changes,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// 変更をプッシュできないストア向けの再取得間隔を設定する
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn list(&self, user_id: &UserId) -> TodoResult<Vec<Todo>> {
        self.store
            .get(GetTodosArgs {
                user_id: user_id.clone(),
            })
            .await
    }

    pub async fn add(&self, text: &str, user_id: &UserId) -> TodoResult<()> {
        self.store
            .add(AddTodoArgs {
                text: text.to_string(),
                user_id: user_id.clone(),
            })
            .await?;
        self.notify(ChangeNotice::for_user(user_id.clone()));
        Ok(())
    }

    pub async fn toggle(&self, id: &TodoId) -> TodoResult<()> {
        self.store.toggle(TodoIdArgs { id: id.clone() }).await?;
        self.notify(ChangeNotice::everyone());
        Ok(())
    }

    pub async fn remove(&self, id: &TodoId) -> TodoResult<()> {
        self.store.remove(TodoIdArgs { id: id.clone() }).await?;
        self.notify(ChangeNotice::everyone());
        Ok(())
    }

    /// `list(user_id)` のライブクエリを開始する
    ///
    /// 返されたハンドルを drop すると背景タスクも停止する。
    /// 停止時点で実行中の再取得は完了しても観測されない。
    pub fn subscribe(&self, user_id: UserId) -> TodoSubscription {
        let (sender, receiver) = watch::channel(None);
        let live_query = LiveQuery {
            store: Arc::clone(&self.store),
            user_id,
            sender,
            local: Some(self.local_changes.subscribe()),
            remote: self.store.changes(),
            poll_interval: self.poll_interval,
        };

        TodoSubscription {
            receiver,
            task: tokio::spawn(live_query.run()),
        }
    }

    fn notify(&self, notice: ChangeNotice) {
        // 購読者がいない場合の送信失敗は無視してよい
        let _ = self.local_changes.send(notice);
    }
}

/// ライブクエリの購読ハンドル
pub struct TodoSubscription {
    receiver: watch::Receiver<LiveTodos>,
    task: JoinHandle<()>,
}

impl TodoSubscription {
    pub fn current(&self) -> LiveTodos {
        self.receiver.borrow().clone()
    }

    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// 次の更新を待ち、その値を返す
    pub async fn changed(&mut self) -> TodoResult<LiveTodos> {
        self.receiver
            .changed()
            .await
            .map_err(|_| TodoError::Transport("Live query closed".to_string()))?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// 条件を満たす一覧が届くまで待つ
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&[Todo]) -> bool,
    ) -> TodoResult<Vec<Todo>> {
        let todos = self
            .receiver
            .wait_for(|live| live.as_deref().is_some_and(&mut predicate))
            .await
            .map_err(|_| TodoError::Transport("Live query closed".to_string()))?;
        Ok(todos.clone().unwrap_or_default())
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TodoSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct LiveQuery {
    store: Arc<dyn TodoStore>,
    user_id: UserId,
    sender: watch::Sender<LiveTodos>,
    local: Option<broadcast::Receiver<ChangeNotice>>,
    remote: Option<broadcast::Receiver<ChangeNotice>>,
    poll_interval: Duration,
}

impl LiveQuery {
    async fn run(mut self) {
        info!(user_id = %self.user_id, "Live query started");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // interval の初回 tick は即時に完了するため、最初の取得もここで行われる
            tokio::select! {
                _ = self.sender.closed() => break,
                _ = ticker.tick() => {}
                notice = next_notice(&mut self.local) => {
                    if !notice.concerns(&self.user_id) {
                        continue;
                    }
                }
                notice = next_notice(&mut self.remote) => {
                    if !notice.concerns(&self.user_id) {
                        continue;
                    }
                }
            }

            self.refresh().await;
        }

        info!(user_id = %self.user_id, "Live query stopped");
    }

    async fn refresh(&self) {
        match self
            .store
            .get(GetTodosArgs {
                user_id: self.user_id.clone(),
            })
            .await
        {
            Ok(todos) => {
                let updated = self.sender.send_if_modified(|current| {
                    if current.as_ref() == Some(&todos) {
                        false
                    } else {
                        *current = Some(todos);
                        true
                    }
                });
                if updated {
                    debug!(user_id = %self.user_id, "Live query updated");
                }
            }
            Err(e) => {
                // 直前の一覧を保持したまま次の機会に再取得する
                warn!(user_id = %self.user_id, error = %e, "Live query refresh failed");
            }
        }
    }
}

/// 通知を 1 件待つ。取りこぼした場合は全体の変更として扱い、
/// チャネルが閉じたら以後は待ち続ける
async fn next_notice(receiver: &mut Option<broadcast::Receiver<ChangeNotice>>) -> ChangeNotice {
    loop {
        let Some(rx) = receiver.as_mut() else {
            return std::future::pending().await;
        };
        match rx.recv().await {
            Ok(notice) => return notice,
            Err(RecvError::Lagged(_)) => return ChangeNotice::everyone(),
            Err(RecvError::Closed) => *receiver = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryTodoStore;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn repository() -> (Arc<InMemoryTodoStore>, TodoRepository) {
        let store = Arc::new(InMemoryTodoStore::new());
        let repository = TodoRepository::new(store.clone());
        (store, repository)
    }

    #[tokio::test]
    async fn test_subscription_starts_loading_then_publishes_empty_list() {
        let (_store, repository) = repository();

        let mut subscription = repository.subscribe(UserId::new("u1"));

        let todos = timeout(WAIT, subscription.wait_for(|_| true))
            .await
            .unwrap()
            .unwrap();
        assert!(todos.is_empty());
        assert_eq!(subscription.current(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_subscription_follows_mutations() {
        let (_store, repository) = repository();
        let user = UserId::new("u1");
        let mut subscription = repository.subscribe(user.clone());

        repository.add("Buy milk", &user).await.unwrap();
        let todos = timeout(WAIT, subscription.wait_for(|todos| todos.len() == 1))
            .await
            .unwrap()
            .unwrap();
        let id = todos[0].id.clone();

        repository.toggle(&id).await.unwrap();
        timeout(WAIT, subscription.wait_for(|todos| todos[0].completed))
            .await
            .unwrap()
            .unwrap();

        repository.remove(&id).await.unwrap();
        timeout(WAIT, subscription.wait_for(|todos| todos.is_empty()))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscription_ignores_other_users_changes() {
        let (_store, repository) = repository();
        let mut subscription = repository.subscribe(UserId::new("u1"));
        timeout(WAIT, subscription.wait_for(|_| true))
            .await
            .unwrap()
            .unwrap();

        repository.add("Not mine", &UserId::new("u2")).await.unwrap();
        repository.add("Mine", &UserId::new("u1")).await.unwrap();

        let todos = timeout(WAIT, subscription.wait_for(|todos| !todos.is_empty()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].text, "Mine");
    }

    #[tokio::test]
    async fn test_store_push_reaches_subscription_without_repository_mutation() {
        let (store, repository) = repository();
        let mut subscription = repository.subscribe(UserId::new("u1"));

        // 別クライアントがストアを直接変更した場合
        store
            .add(AddTodoArgs {
                text: "From elsewhere".to_string(),
                user_id: UserId::new("u1"),
            })
            .await
            .unwrap();

        let todos = timeout(WAIT, subscription.wait_for(|todos| !todos.is_empty()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(todos[0].text, "From elsewhere");
    }

    #[tokio::test]
    async fn test_dropping_subscription_stops_task() {
        let (_store, repository) = repository();
        let subscription = repository.subscribe(UserId::new("u1"));
        assert!(subscription.is_active());

        subscription.cancel();

        // 停止後の変更でも何も起きない
        repository.add("Buy milk", &UserId::new("u1")).await.unwrap();
        assert_eq!(repository.list(&UserId::new("u1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_mutation_is_returned_unchanged() {
        let (_store, repository) = repository();
        let id = TodoId::new();

        let err = repository.toggle(&id).await.unwrap_err();

        assert_eq!(err, TodoError::NotFound(id.to_string()));
    }
}
