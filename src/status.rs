//! Status HTTP Server
//!
//! Read-only view of the agent orchestrator for ops tooling.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::orchestrator::AgentOrchestrator;

#[derive(Clone)]
struct StatusState {
    orchestrator: Arc<AgentOrchestrator>,
    started: Instant,
}

/// Build the status router
pub fn router(orchestrator: Arc<AgentOrchestrator>) -> Router {
    let state = StatusState {
        orchestrator,
        started: Instant::now(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/agents", get(agents_handler))
        .route("/agents/{name}", get(agent_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    orchestrator: Arc<AgentOrchestrator>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Status server listening on {}", addr);

    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Status server shut down");
    Ok(())
}

async fn health_handler(State(state): State<StatusState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started.elapsed().as_secs(),
        "orchestrator_running": state.orchestrator.is_running(),
    }))
}

async fn agents_handler(State(state): State<StatusState>) -> impl IntoResponse {
    Json(state.orchestrator.get_status())
}

async fn agent_handler(State(state): State<StatusState>, Path(name): Path<String>) -> Response {
    match state.orchestrator.get_agent(&name) {
        Some(agent) => Json(agent.status()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown agent '{}'", name) })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{Agent, AgentRunner};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Idle;

    #[async_trait]
    impl Agent for Idle {
        fn name(&self) -> &str {
            "context"
        }

        async fn tick(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn counters(&self) -> Vec<(&'static str, u64)> {
            vec![("contexts_generated", 0)]
        }
    }

    fn app() -> Router {
        let orchestrator = Arc::new(AgentOrchestrator::new());
        orchestrator.register(Arc::new(AgentRunner::new(Arc::new(Idle), Duration::from_secs(300))));
        router(orchestrator)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = get_json(app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["orchestrator_running"], false);
    }

    #[tokio::test]
    async fn test_agents_listing() {
        let (status, json) = get_json(app(), "/agents").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total_agents"], 1);
        assert_eq!(json["stopped_agents"], 1);
        assert_eq!(json["agents"][0]["name"], "context");
        assert_eq!(json["agents"][0]["check_interval_seconds"], 300);
        assert_eq!(json["agents"][0]["counters"]["contexts_generated"], 0);
    }

    #[tokio::test]
    async fn test_single_agent_and_unknown() {
        let (status, json) = get_json(app(), "/agents/context").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success_rate"], 0.0);

        let (status, json) = get_json(app(), "/agents/bogus").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("bogus"));
    }
}
