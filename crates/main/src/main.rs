//! 主应用程序入口
//!
//! 加载配置、装配存储与应用服务，启动 Axum Web API 服务。

use std::sync::Arc;

use anyhow::Context;
use application::{ServiceContainer, StoreSet, SystemClock};
use config::AppConfig;
use infrastructure::Infrastructure;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("加载配置失败")?;
    tracing::info!(backend = ?config.store.backend, "配置已加载");

    let infra = Infrastructure::connect(&config)
        .await
        .context("初始化存储失败")?;
    let stores = StoreSet {
        feed: infra.feed,
        interests: infra.interests,
        conversations: infra.conversations,
        messages: infra.messages,
        presence: infra.presence,
        notifications: infra.notifications,
    };

    let services = ServiceContainer::new(stores, Arc::new(SystemClock), &config);
    let jwt = Arc::new(JwtService::new(&config.auth));

    let app = router(AppState::new(services, jwt))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法监听 {addr}"))?;

    tracing::info!("服务启动在 http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "监听退出信号失败");
    }
}
