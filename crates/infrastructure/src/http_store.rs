use crate::TodoStore;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use todo_domain::{AddTodoArgs, GetTodosArgs, Todo, TodoError, TodoIdArgs, TodoResult};
use tracing::{debug, warn};

/// ストア関数のエラーレスポンス本体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

impl From<&TodoError> for ErrorBody {
    fn from(error: &TodoError) -> Self {
        Self {
            error: ErrorDetail {
                kind: error.kind().to_string(),
                message: error.message().to_string(),
            },
        }
    }
}

/// `todo-api` のストア関数を HTTP 越しに呼び出すクライアント
#[derive(Clone)]
pub struct HttpTodoStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTodoStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    async fn call<A: Serialize + Sync>(
        &self,
        function: &str,
        args: &A,
    ) -> TodoResult<reqwest::Response> {
        let url = format!("{}/api/{}", self.base_url, function);
        debug!(%url, "Calling store function");

        let response = self
            .client
            .post(&url)
            .json(args)
            .send()
            .await
            .map_err(|e| TodoError::Transport(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let error = decode_error(response).await;
        warn!(function, error = %error, "Store function rejected the call");
        Err(error)
    }
}

async fn decode_error(response: reqwest::Response) -> TodoError {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => TodoError::from_kind(&body.error.kind, body.error.message),
        Err(_) => {
            let message = format!("Unexpected status {status}");
            match status {
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                    TodoError::Validation(message)
                }
                StatusCode::NOT_FOUND => TodoError::NotFound(message),
                StatusCode::CONFLICT => TodoError::Conflict(message),
                _ => TodoError::Transport(message),
            }
        }
    }
}

#[async_trait]
impl TodoStore for HttpTodoStore {
    async fn get(&self, args: GetTodosArgs) -> TodoResult<Vec<Todo>> {
        self.call("todos.get", &args)
            .await?
            .json()
            .await
            .map_err(|e| TodoError::Transport(e.to_string()))
    }

    async fn add(&self, args: AddTodoArgs) -> TodoResult<()> {
        self.call("todos.add", &args).await.map(|_| ())
    }

    async fn toggle(&self, args: TodoIdArgs) -> TodoResult<()> {
        self.call("todos.toggle", &args).await.map(|_| ())
    }

    async fn remove(&self, args: TodoIdArgs) -> TodoResult<()> {
        self.call("todos.remove", &args).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let store = HttpTodoStore::new("http://localhost:3000/");
        assert_eq!(store.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_error_body_shape() {
        let body = ErrorBody::from(&TodoError::NotFound("01J".to_string()));

        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"error": {"kind": "not_found", "message": "01J"}})
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // ポート 9 (discard) には通常何も待ち受けていない
        let store = HttpTodoStore::new("http://127.0.0.1:9");

        let err = store
            .get(GetTodosArgs {
                user_id: todo_domain::UserId::new("u1"),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TodoError::Transport(_)));
    }
}
