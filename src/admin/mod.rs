//! Operator HTTP API.
//!
//! # Routes
//! ```text
//! GET    /admin/status                  version, refresh state
//! GET    /admin/services                per-service circuit/cache/pending
//! GET    /admin/rate-limits             vendor budget usage
//! POST   /admin/refresh[?quick=true]    start a cycle (202, or 409 if running)
//! POST   /admin/services/{name}/reset   force the circuit closed
//! DELETE /admin/services/{name}/cache   drop cached responses
//! DELETE /admin/errors                  clear the refresh error list
//! ```
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::client::ServiceRegistry;
use crate::refresh::RefreshOrchestrator;

#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<ServiceRegistry>,
    pub orchestrator: RefreshOrchestrator,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/services", get(get_services))
        .route("/admin/rate-limits", get(get_rate_limits))
        .route("/admin/refresh", post(trigger_refresh))
        .route("/admin/services/{name}/reset", post(reset_service))
        .route("/admin/services/{name}/cache", delete(clear_service_cache))
        .route("/admin/errors", delete(clear_errors))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub async fn serve(
    state: AdminState,
    addr: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FetchError, Transport, TransportResponse};
    use crate::config::{MonitorConfig, RefreshConfig};
    use crate::refresh::Tier;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use futures_util::future::{BoxFuture, FutureExt};
    use tower::ServiceExt;

    struct Offline;

    impl Transport for Offline {
        fn get<'a>(
            &'a self,
            _url: &'a str,
            _accept: Option<&'a str>,
        ) -> BoxFuture<'a, Result<TransportResponse, FetchError>> {
            async { Err::<TransportResponse, _>(FetchError::Network("offline".into())) }.boxed()
        }
    }

    fn state() -> AdminState {
        AdminState {
            registry: Arc::new(ServiceRegistry::from_config(
                &MonitorConfig::default(),
                Arc::new(Offline),
            )),
            orchestrator: RefreshOrchestrator::new(RefreshConfig::default()),
            api_key: Arc::from("secret"),
        }
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_key() {
        let app = setup_admin_router(state());

        let missing = Request::builder()
            .uri("/admin/status")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(missing).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let wrong = Request::builder()
            .uri("/admin/status")
            .header("Authorization", "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(wrong).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app.oneshot(request(Method::GET, "/admin/status")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json(res).await;
        assert_eq!(body["status"], "operational");
        assert_eq!(body["refresh"]["is_refreshing"], false);
    }

    #[tokio::test]
    async fn test_services_and_rate_limits() {
        let app = setup_admin_router(state());

        let res = app
            .clone()
            .oneshot(request(Method::GET, "/admin/services"))
            .await
            .unwrap();
        let body = json(res).await;
        assert_eq!(body.as_array().unwrap().len(), 5);
        assert_eq!(body[0]["name"], "crypto");
        assert_eq!(body[0]["circuit"]["state"], "CLOSED");

        let res = app
            .oneshot(request(Method::GET, "/admin/rate-limits"))
            .await
            .unwrap();
        let body = json(res).await;
        assert_eq!(body[0]["name"], "coingecko");
        assert_eq!(body[0]["available"], 25);
    }

    #[tokio::test]
    async fn test_service_maintenance_routes() {
        let state = state();
        let app = setup_admin_router(state.clone());
        state.registry.client("news").unwrap().breaker().record_failure();

        let res = app
            .clone()
            .oneshot(request(Method::POST, "/admin/services/news/reset"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.registry.client("news").unwrap().breaker().failures(), 0);

        let res = app
            .clone()
            .oneshot(request(Method::DELETE, "/admin/services/news/cache"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = app
            .oneshot(request(Method::POST, "/admin/services/weather/reset"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_and_clear_errors() {
        let state = state();
        state.orchestrator.register(Tier::Critical, "News", || async {
            Err::<(), _>(crate::refresh::FetcherError::new("offline"))
        });
        let app = setup_admin_router(state.clone());

        let res = app
            .clone()
            .oneshot(request(Method::POST, "/admin/refresh?quick=true"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(state.orchestrator.state().errors, vec!["News: offline"]);

        let res = app
            .oneshot(request(Method::DELETE, "/admin/errors"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(state.orchestrator.state().errors.is_empty());
    }
}
