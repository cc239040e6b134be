use thiserror::Error;

/// ストア操作のエラー分類
///
/// リポジトリはこのエラーを捕捉・リトライせず、そのまま呼び出し側へ返す。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TodoError {
    /// 空文字列など、呼び出し側が不正な引数を渡した
    #[error("Validation error: {0}")]
    Validation(String),

    /// 指定された ID のレコードが存在しない
    #[error("Todo not found: {0}")]
    NotFound(String),

    /// ネットワーク断やストア到達不能
    #[error("Transport error: {0}")]
    Transport(String),

    /// 完了フラグの反転中に値が安定しなかった
    #[error("Concurrent modification detected: {0}")]
    Conflict(String),
}

impl TodoError {
    /// ワイヤ上で使うエラー種別名
    pub fn kind(&self) -> &'static str {
        match self {
            TodoError::Validation(_) => "validation",
            TodoError::NotFound(_) => "not_found",
            TodoError::Transport(_) => "transport",
            TodoError::Conflict(_) => "conflict",
        }
    }

    /// 種別名とメッセージからエラーを復元する。未知の種別は Transport 扱い。
    pub fn from_kind(kind: &str, message: String) -> Self {
        match kind {
            "validation" => TodoError::Validation(message),
            "not_found" => TodoError::NotFound(message),
            "conflict" => TodoError::Conflict(message),
            _ => TodoError::Transport(message),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TodoError::Validation(m)
            | TodoError::NotFound(m)
            | TodoError::Transport(m)
            | TodoError::Conflict(m) => m,
        }
    }
}

pub type TodoResult<T> = Result<T, TodoError>;
