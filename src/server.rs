use axum::routing::get;
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::clock::SystemClock;
use crate::config::{Config, StoreBackend};
use crate::error::Result;
use crate::handlers::{health_check, public, sale};
use crate::middleware::{logging_middleware, rate_limit_middleware};
use crate::rate_limit_config::RateLimitConfig;
use crate::redis::RedisStore;
use crate::store::{CounterStore, MemoryStore};
use crate::throttler::Throttler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub throttler: Arc<Throttler>,
    pub store: Arc<dyn CounterStore>,
}

impl AppState {
    pub fn new(throttler: Arc<Throttler>, store: Arc<dyn CounterStore>) -> Self {
        Self { throttler, store }
    }
}

/// Rate limited routes plus an unthrottled health check.
pub fn create_app(state: AppState) -> Router {
    let limited = Router::new()
        .route("/", get(public))
        .route("/sale", get(sale))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .merge(limited)
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub async fn new(config: &Config, rate_limits: RateLimitConfig) -> Result<Self> {
        let clock = Arc::new(SystemClock);

        let store: Arc<dyn CounterStore> = match config.store {
            StoreBackend::Redis => {
                Arc::new(RedisStore::connect(&config.redis_url, config.redis_retries).await?)
            }
            StoreBackend::Memory => {
                warn!("Using in-process counter store; limits are not shared across processes");
                Arc::new(MemoryStore::new(clock.clone()))
            }
        };

        let throttler = Arc::new(Throttler::new(Arc::new(rate_limits), store.clone(), clock));
        let app = create_app(AppState::new(throttler, store));

        Ok(Self {
            app,
            bind_addr: config.bind_addr,
        })
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        info!("Gatekeeper listening on {}", self.bind_addr);
        info!("Health check available at /health");

        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
