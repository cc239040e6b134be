//! ストア関数の HTTP 公開（axum）
//!
//! `POST /api/todos.get` などの 4 関数と `/health` を提供します。
//! 引数レコードを JSON で受け取り、`TodoStore` にそのまま委譲します。

mod error;

pub use error::ApiError;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use infrastructure::{DynamoDbClient, DynamoDbTodoStore, InMemoryTodoStore, TodoStore};
use serde::Serialize;
use shared::{Config, StoreBackend};
use std::sync::Arc;
use todo_domain::{AddTodoArgs, GetTodosArgs, Todo, TodoIdArgs, TodoResult};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// アプリケーションの共有状態
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn TodoStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        Self { store }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryTodoStore::new()))
    }
}

/// InMemory ストアでルータを構築して返します。
pub fn app() -> Router {
    app_with_state(AppState::default())
}

/// 外部から状態を注入できる版
pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/todos.get", post(get_todos))
        .route("/api/todos.add", post(add_todo))
        .route("/api/todos.toggle", post(toggle_todo))
        .route("/api/todos.remove", post(remove_todo))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

/// 設定に従ってストアを構築する
///
/// DynamoDB のエンドポイントが明示されている場合はローカル環境とみなし、
/// テーブルが無ければ作成する。
pub async fn store_from_config(config: &Config) -> TodoResult<Arc<dyn TodoStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            info!("Using in-memory todo store");
            Ok(Arc::new(InMemoryTodoStore::new()))
        }
        StoreBackend::DynamoDb => {
            info!(table = %config.dynamodb_table, "Using DynamoDB todo store");
            let db = DynamoDbClient::new(config).await;
            if config.dynamodb_endpoint.is_some() {
                db.ensure_table().await?;
            }
            Ok(Arc::new(DynamoDbTodoStore::new(db)))
        }
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

#[derive(Debug, Serialize)]
struct HealthBody {
    /// サービスの簡易ステータス
    status: &'static str,
}

/// ヘルスチェック用ハンドラ
async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthBody { status: "ok" }))
}

async fn get_todos(
    State(state): State<AppState>,
    payload: Result<Json<GetTodosArgs>, JsonRejection>,
) -> Result<Json<Vec<Todo>>, ApiError> {
    let Json(args) = payload?;
    Ok(Json(state.store.get(args).await?))
}

async fn add_todo(
    State(state): State<AppState>,
    payload: Result<Json<AddTodoArgs>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(args) = payload?;
    state.store.add(args).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_todo(
    State(state): State<AppState>,
    payload: Result<Json<TodoIdArgs>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(args) = payload?;
    state.store.toggle(args).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_todo(
    State(state): State<AppState>,
    payload: Result<Json<TodoIdArgs>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(args) = payload?;
    state.store.remove(args).await?;
    Ok(StatusCode::NO_CONTENT)
}
