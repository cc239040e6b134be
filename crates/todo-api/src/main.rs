//! todo-api バイナリのエントリポイント
//! Lambda 上では lambda_http で、それ以外ではローカルの HTTP サーバとして起動します。

use anyhow::Context;
use shared::{init_tracing, Config};
use todo_api::{app_with_state, store_from_config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().map_err(|e| anyhow::anyhow!(e))?;

    let config = Config::from_env()?;
    let store = store_from_config(&config)
        .await
        .context("failed to initialize todo store")?;
    let router = app_with_state(AppState::new(store));

    if std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        tracing::info!(environment = %config.environment, "Starting Lambda runtime");
        return lambda_http::run(router).await.map_err(|e| anyhow::anyhow!(e));
    }

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, environment = %config.environment, "Server starting");

    axum::serve(listener, router).await.context("server error")
}
