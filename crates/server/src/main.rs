mod bootstrap;
mod chat;
mod health;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::http::HeaderValue;
use axum::Router;
use leadgate_agent::Orchestrator;
use leadgate_core::config::{AppConfig, LoadOptions, ServerConfig};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

fn init_logging(config: &AppConfig) {
    use leadgate_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub fn app(orchestrator: Arc<Orchestrator>, server: &ServerConfig) -> Router {
    Router::new()
        .merge(health::router(orchestrator.clone()))
        .merge(chat::router(orchestrator))
        .layer(cors_layer(&server.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(
                    event_name = "system.server.cors_origin_invalid",
                    correlation_id = "bootstrap",
                    origin = %origin,
                    "ignoring invalid CORS origin"
                );
                None
            }
        })
        .collect::<Vec<_>>();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app_state = bootstrap::bootstrap_with_config(config).await?;
    let server = app_state.config.server.clone();
    let orchestrator = app_state.orchestrator;

    let address = format!("{}:{}", server.bind_address, server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "leadgate-server listening"
    );

    axum::serve(listener, app(orchestrator.clone(), &server))
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "draining pending lead log writes"
    );
    let pending = orchestrator
        .recorder()
        .drain(Duration::from_secs(server.graceful_shutdown_secs))
        .await;
    info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        drained_writes = pending,
        "leadgate-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use leadgate_agent::{Orchestrator, UnconfiguredClient};
    use leadgate_core::config::ServerConfig;
    use leadgate_core::{AppConfig, InMemoryAuditSink};
    use leadgate_db::NoopLeadLog;
    use tower::ServiceExt;

    use crate::app;

    fn orchestrator() -> Arc<Orchestrator> {
        Arc::new(
            Orchestrator::from_config(
                &AppConfig::default(),
                Arc::new(UnconfiguredClient),
                Arc::new(NoopLeadLog),
                Arc::new(InMemoryAuditSink::default()),
            )
            .expect("orchestrator"),
        )
    }

    async fn allowed_origin(server: &ServerConfig, origin: &str) -> Option<String> {
        let response = app(orchestrator(), server)
            .oneshot(
                Request::get("/health")
                    .header(header::ORIGIN, origin)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    #[tokio::test]
    async fn empty_origin_list_allows_any_origin() {
        let server = AppConfig::default().server;
        assert_eq!(allowed_origin(&server, "https://evangelista.co").await.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn configured_origins_are_enforced() {
        let mut server = AppConfig::default().server;
        server.allowed_origins = vec!["https://evangelista.co".to_string()];

        assert_eq!(
            allowed_origin(&server, "https://evangelista.co").await.as_deref(),
            Some("https://evangelista.co")
        );
        assert_eq!(allowed_origin(&server, "https://elsewhere.example").await, None);
    }
}
