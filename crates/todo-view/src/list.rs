use crate::{AddTodoDialog, ScreenState, TodoItemView, TodoListScreen};
use infrastructure::{TodoRepository, TodoStore, TodoSubscription};
use shared::{Config, CurrentUser, IdentitySource};
use std::sync::Arc;
use std::time::Duration;
use todo_domain::{Todo, TodoId, TodoResult};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(5);

/// 行から発生する操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemIntent {
    Toggle(TodoId),
    Delete(TodoId),
}

/// 失敗した操作の一時通知
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    raised_at: Instant,
}

impl Notification {
    fn is_live(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.raised_at) < ttl
    }
}

/// Todo 一覧画面のビューモデル
///
/// 認証状態と購読結果から描画内容を決める。レコードのローカルコピーは持たず、
/// 保持するのは入力中のテキスト、ダイアログの開閉、通知だけ。
/// イベントは 1 つのタスクから `&mut self` で順に処理する。
pub struct TodoListView {
    repository: TodoRepository,
    identity: watch::Receiver<Option<CurrentUser>>,
    user: Option<CurrentUser>,
    /// ID プロバイダが破棄された後は現在のユーザーのまま固定する
    identity_closed: bool,
    subscription: Option<TodoSubscription>,
    new_todo_text: String,
    dialog_open: bool,
    notifications: Vec<Notification>,
    notification_ttl: Duration,
}

impl TodoListView {
    pub fn new(repository: TodoRepository, identity: &IdentitySource) -> Self {
        let mut view = Self {
            repository,
            identity: identity.watch(),
            user: None,
            identity_closed: false,
            subscription: None,
            new_todo_text: String::new(),
            dialog_open: false,
            notifications: Vec::new(),
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
        };
        view.sync_identity();
        view
    }

    /// 設定の再取得間隔と通知の表示時間で構築する
    pub fn from_config(store: Arc<dyn TodoStore>, identity: &IdentitySource, config: &Config) -> Self {
        let repository = TodoRepository::new(store).with_poll_interval(config.live_query_poll);
        Self::new(repository, identity).with_notification_ttl(config.notification_ttl)
    }

    pub fn with_notification_ttl(mut self, ttl: Duration) -> Self {
        self.notification_ttl = ttl;
        self
    }

    pub fn current_user(&self) -> Option<&CurrentUser> {
        self.user.as_ref()
    }

    /// ID プロバイダの最新状態を反映する
    ///
    /// ユーザーが変わった場合は古い購読を止め、新しいユーザーで購読し直す。
    pub fn sync_identity(&mut self) {
        let latest = self.identity.borrow_and_update().clone();
        if latest == self.user {
            return;
        }

        debug!(
            user_id = latest.as_ref().map(|u| u.id.as_str()),
            "Identity changed"
        );
        self.subscription = latest
            .as_ref()
            .map(|user| self.repository.subscribe(user.id.clone()));
        if latest.is_none() {
            self.new_todo_text.clear();
            self.dialog_open = false;
        }
        self.user = latest;
    }

    pub fn open_dialog(&mut self) {
        if self.user.is_some() {
            self.dialog_open = true;
        }
    }

    pub fn close_dialog(&mut self) {
        self.dialog_open = false;
    }

    pub fn is_dialog_open(&self) -> bool {
        self.dialog_open
    }

    pub fn set_new_todo_text(&mut self, text: impl Into<String>) {
        self.new_todo_text = text.into();
    }

    pub fn new_todo_text(&self) -> &str {
        &self.new_todo_text
    }

    /// 入力欄でのキー入力。Enter は送信と同じ
    pub async fn input_key_down(&mut self, key: &str) -> TodoResult<()> {
        if key == "Enter" {
            self.submit_new_todo().await
        } else {
            Ok(())
        }
    }

    /// 入力中のテキストで Todo を追加する
    ///
    /// 空白のみのテキストや未認証時は何も呼ばない。入力欄のクリアとダイアログの
    /// クローズはストアの確定を待たずに行い、結果に関わらず戻さない。
    pub async fn submit_new_todo(&mut self) -> TodoResult<()> {
        let Some(user) = self.user.clone() else {
            return Ok(());
        };
        if self.new_todo_text.trim().is_empty() {
            return Ok(());
        }

        let text = std::mem::take(&mut self.new_todo_text);
        self.dialog_open = false;

        let result = self.repository.add(&text, &user.id).await;
        self.report("add", result)
    }

    /// 未認証時は操作手段が無いため何も呼ばない
    pub async fn toggle(&mut self, id: &TodoId) -> TodoResult<()> {
        if self.user.is_none() {
            return Ok(());
        }
        let result = self.repository.toggle(id).await;
        self.report("toggle", result)
    }

    pub async fn remove(&mut self, id: &TodoId) -> TodoResult<()> {
        if self.user.is_none() {
            return Ok(());
        }
        let result = self.repository.remove(id).await;
        self.report("remove", result)
    }

    pub async fn handle(&mut self, intent: ItemIntent) -> TodoResult<()> {
        match intent {
            ItemIntent::Toggle(id) => self.toggle(&id).await,
            ItemIntent::Delete(id) => self.remove(&id).await,
        }
    }

    /// 表示中の行のチェックボックスを押す。表示されていない ID は無視する
    pub async fn press_checkbox(&mut self, id: &TodoId) -> TodoResult<()> {
        match self.row_intent(id, RowControl::Checkbox) {
            Some(intent) => self.handle(intent).await,
            None => Ok(()),
        }
    }

    /// 表示中の行の Delete ボタンを押す
    pub async fn press_delete(&mut self, id: &TodoId) -> TodoResult<()> {
        match self.row_intent(id, RowControl::Delete) {
            Some(intent) => self.handle(intent).await,
            None => Ok(()),
        }
    }

    /// 購読中の一覧。未認証または読み込み中は `None`
    pub fn todos(&self) -> Option<Vec<Todo>> {
        self.subscription.as_ref().and_then(|s| s.current())
    }

    /// 認証状態か一覧のどちらかが変わるまで待つ
    ///
    /// ID プロバイダが破棄された場合は以後一覧の更新だけを待つ。
    pub async fn changed(&mut self) -> TodoResult<()> {
        loop {
            let identity_open = !self.identity_closed;
            let subscription = self.subscription.as_mut();

            tokio::select! {
                result = self.identity.changed(), if identity_open => {
                    if result.is_err() {
                        debug!("Identity source closed, keeping current user");
                        self.identity_closed = true;
                        continue;
                    }
                }
                result = next_list(subscription) => result?,
            }

            self.sync_identity();
            return Ok(());
        }
    }

    /// 条件を満たす画面になるまで更新を待つ
    pub async fn wait_until(
        &mut self,
        mut predicate: impl FnMut(&TodoListScreen) -> bool,
    ) -> TodoResult<TodoListScreen> {
        loop {
            let screen = self.render();
            if predicate(&screen) {
                return Ok(screen);
            }
            self.changed().await?;
        }
    }

    pub fn dismiss_notification(&mut self, index: usize) {
        if index < self.notifications.len() {
            self.notifications.remove(index);
        }
    }

    /// 期限切れの通知を捨てる
    pub fn prune_notifications(&mut self) {
        let (ttl, now) = (self.notification_ttl, Instant::now());
        self.notifications.retain(|n| n.is_live(ttl, now));
    }

    pub fn render(&self) -> TodoListScreen {
        if self.user.is_none() {
            return TodoListScreen::sign_in_prompt();
        }

        let rows: Vec<_> = self
            .todos()
            .unwrap_or_default()
            .iter()
            .map(|todo| item_view(todo).render())
            .collect();

        let (ttl, now) = (self.notification_ttl, Instant::now());
        TodoListScreen {
            state: if rows.is_empty() {
                ScreenState::Empty
            } else {
                ScreenState::Populated
            },
            rows,
            dialog: self.dialog_open.then(|| AddTodoDialog {
                text: self.new_todo_text.clone(),
            }),
            notifications: self
                .notifications
                .iter()
                .filter(|n| n.is_live(ttl, now))
                .map(|n| n.message.clone())
                .collect(),
        }
    }

    fn row_intent(&self, id: &TodoId, control: RowControl) -> Option<ItemIntent> {
        self.user.as_ref()?;
        let todos = self.todos()?;
        let item = item_view(todos.iter().find(|todo| &todo.id == id)?);
        Some(match control {
            RowControl::Checkbox => item.toggle(),
            RowControl::Delete => item.delete(),
        })
    }

    fn report(&mut self, operation: &'static str, result: TodoResult<()>) -> TodoResult<()> {
        if let Err(e) = &result {
            warn!(operation, error = %e, "Todo mutation failed");
            self.prune_notifications();
            self.notifications.push(Notification {
                message: e.to_string(),
                raised_at: Instant::now(),
            });
        }
        result
    }
}

enum RowControl {
    Checkbox,
    Delete,
}

fn item_view(
    todo: &Todo,
) -> TodoItemView<'_, impl Fn(&TodoId) -> ItemIntent, impl Fn(&TodoId) -> ItemIntent> {
    TodoItemView::new(
        &todo.id,
        &todo.text,
        todo.completed,
        |id: &TodoId| ItemIntent::Toggle(id.clone()),
        |id: &TodoId| ItemIntent::Delete(id.clone()),
    )
}

/// 購読があればその次の更新を、無ければ永久に待つ
async fn next_list(subscription: Option<&mut TodoSubscription>) -> TodoResult<()> {
    match subscription {
        Some(subscription) => subscription.changed().await.map(|_| ()),
        None => std::future::pending().await,
    }
}
