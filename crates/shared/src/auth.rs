use serde::{Deserialize, Serialize};
use std::sync::Arc;
use todo_domain::UserId;
use tokio::sync::watch;
use tracing::info;

/// ID プロバイダが解決した現在のユーザー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
        }
    }
}

/// 外部 ID プロバイダのクライアント側の窓口
///
/// 現在のユーザーを watch チャネルで配信する。`None` は未認証を表す。
#[derive(Debug, Clone)]
pub struct IdentitySource {
    sender: Arc<watch::Sender<Option<CurrentUser>>>,
}

impl IdentitySource {
    pub fn new(initial: Option<CurrentUser>) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn signed_out() -> Self {
        Self::new(None)
    }

    pub fn current(&self) -> Option<CurrentUser> {
        self.sender.borrow().clone()
    }

    pub fn sign_in(&self, user: CurrentUser) {
        info!(user_id = %user.id, "User signed in");
        self.sender.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        info!("User signed out");
        self.sender.send_replace(None);
    }

    pub fn watch(&self) -> watch::Receiver<Option<CurrentUser>> {
        self.sender.subscribe()
    }
}

impl Default for IdentitySource {
    fn default() -> Self {
        Self::signed_out()
    }
}
