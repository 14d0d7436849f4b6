// Framework bootstrap for the duel server runtime.

use crate::domain::ROUND_COUNT;
use crate::domain::ports::ItemCatalog;
use crate::frameworks::config::{self, ServerSettings};
use crate::interface_adapters::catalog::InMemoryCatalog;
use crate::interface_adapters::net::{
    online_players_handler, session_snapshot_handler, spawn_session_serializer, ws_handler,
};
use crate::interface_adapters::state::{AppState, SystemClock};
use crate::use_cases::{Matchmaker, SessionRegistry, SessionSettings};

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json")) {
        builder.json().with_current_span(true).init();
    } else {
        builder.compact().init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/session/{session_id}", get(session_snapshot_handler))
        .route("/players/online", get(online_players_handler))
        .with_state(state)
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    run_with_settings(listener, ServerSettings::from_env()).await
}

pub async fn run_with_settings(
    listener: tokio::net::TcpListener,
    settings: ServerSettings,
) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state(&settings).await?;
    let app = app(state);

    tracing::info!(
        %address,
        time_unit_ms = settings.time_unit_ms,
        round_duration = settings.round_duration,
        "listening"
    );

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn load_catalog(settings: &ServerSettings) -> Result<InMemoryCatalog> {
    let min_items = ROUND_COUNT as usize;
    let Some(path) = &settings.catalog_path else {
        return Ok(InMemoryCatalog::builtin());
    };
    let catalog = InMemoryCatalog::load(path, min_items).map_err(|e| {
        std::io::Error::other(format!("failed to load catalog {}: {e}", path.display()))
    })?;
    tracing::info!(path = %path.display(), items = catalog.len(), "catalog loaded");
    Ok(catalog)
}

pub async fn build_state(settings: &ServerSettings) -> Result<Arc<AppState>> {
    let catalog: Arc<dyn ItemCatalog> = Arc::new(load_catalog(settings)?);

    // Session Registry
    // This owns the set of running session orchestrators.
    let sessions = Arc::new(SessionRegistry::new(
        SessionSettings {
            command_channel_capacity: config::COMMAND_CHANNEL_CAPACITY,
            event_broadcast_capacity: config::EVENT_BROADCAST_CAPACITY,
            tick_interval: settings.tick_interval(),
            time_unit_ms: settings.time_unit_ms,
            round_duration: settings.round_duration,
            round_count: ROUND_COUNT,
            retention: settings.session_retention,
        },
        Arc::new(SystemClock),
        catalog,
        Arc::new(spawn_session_serializer),
    ));
    let matchmaker = Arc::new(Matchmaker::new(sessions.clone(), settings.invite_timeout));

    Ok(Arc::new(AppState {
        matchmaker,
        sessions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn build_test_state() -> Arc<AppState> {
        build_state(&ServerSettings::default())
            .await
            .expect("expected state to build")
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("expected request to build");

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("expected response body");
        let payload = serde_json::from_slice(&body).expect("expected json body");
        (status, payload)
    }

    #[tokio::test]
    async fn when_session_is_unknown_then_returns_404_and_error_message() {
        let app = app(build_test_state().await);

        let (status, payload) = get_json(app, "/api/session/does-not-exist").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(payload["error"], "session not found");
    }

    #[tokio::test]
    async fn when_session_exists_then_returns_its_snapshot() {
        let state = build_test_state().await;
        let handle = state
            .sessions
            .create_session(["alice".to_string(), "bob".to_string()])
            .await
            .expect("expected session to start");
        let app = app(state);

        let (status, payload) = get_json(app, &format!("/api/session/{}", handle.session_id)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["session_id"], handle.session_id.as_ref());
        assert_eq!(payload["round_count"], 5);
        assert_eq!(payload["round_duration"], 25);
        assert_eq!(payload["time_unit_ms"], 1000);
        assert_eq!(payload["participants"][1], "bob");
        let rounds = payload["rounds"].as_array().expect("expected rounds");
        assert_eq!(rounds.len(), 5);
        assert_eq!(rounds[0]["index"], 0);
        assert!(rounds[4]["image_path"].as_str().is_some());
        assert!(rounds[4]["hints"].as_array().is_some_and(|h| h.len() >= 3));
    }

    #[tokio::test]
    async fn when_nobody_is_online_then_online_list_is_empty() {
        let app = app(build_test_state().await);

        let (status, payload) = get_json(app, "/players/online").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload, serde_json::json!([]));
    }

    #[tokio::test]
    async fn when_session_route_is_called_with_post_then_returns_405() {
        let app = app(build_test_state().await);

        let request = Request::builder()
            .method("POST")
            .uri("/api/session/abc")
            .body(Body::empty())
            .expect("expected request to build");

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn when_catalog_path_is_missing_then_state_fails_to_build() {
        let settings = ServerSettings {
            catalog_path: Some("/nonexistent/catalog.toml".into()),
            ..ServerSettings::default()
        };

        assert!(build_state(&settings).await.is_err());
    }
}
