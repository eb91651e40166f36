//! 主应用程序入口
//!
//! 加载配置，组装历史存储与网关事件循环，启动 Axum 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{GatewayHub, GatewayHubDependencies, HistoryService, SystemClock};
use axum::http::HeaderValue;
use config::AppConfig;
use infrastructure::build_message_store;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let store = build_message_store(&config.history)
        .await
        .context("failed to initialise history store")?;
    let history = Arc::new(HistoryService::new(store));

    let (hub, hub_task) = GatewayHub::spawn(GatewayHubDependencies {
        history: history.clone(),
        clock: Arc::new(SystemClock),
        presence_batch_limit: config.gateway.presence_batch_limit,
        archive_messages: config.history.archive_messages,
    });

    let app = router(AppState::new(hub.clone(), history))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server.cors_origins));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!("网关启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    hub.shutdown();
    hub_task.await.context("gateway hub task failed")?;
    tracing::info!("网关已停止");

    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(origin = %origin, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(allowed)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到停止信号，开始优雅关闭");
}
