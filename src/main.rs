use std::net::{IpAddr, SocketAddr};

use guard_backend::{AppState, config::Config, router::build_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    if config.status_secret.is_none() {
        tracing::info!("STATUS_SECRET not set, status endpoint only reports liveness");
    }

    // 远程存储、缓存和限流器都在这里构造一次
    let state = AppState::from_config(config).expect("Failed to build application state");

    for (bucket, stats) in state.limiters.stats() {
        tracing::info!(
            "Rate limit {}: {} requests per {}s ({:?} backend)",
            bucket,
            stats.limit,
            stats.window_secs,
            stats.backend
        );
    }

    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );

    let router = build_router(state);

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
