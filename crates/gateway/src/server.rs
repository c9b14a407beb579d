use std::sync::Arc;

use {
    axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    serde::Serialize,
    tracing::info,
};

use {
    courier_chat::ChatService,
    courier_codex::{AppServerClient, AppServerConfig, CodexClient},
    courier_common::InboundMessage,
    courier_config::Settings,
    courier_sessions::SessionStore,
};

use crate::{dispatch::Dispatcher, locks::ChatLocks, sidecar::SidecarClient};

/// Header the sidecar uses to authenticate itself.
const SIDECAR_SECRET_HEADER: &str = "x-sidecar-secret";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub sidecar_shared_secret: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct InboundAccepted {
    accepted: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: &'static str,
}

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/whatsapp/inbound", post(inbound_handler))
        .with_state(state)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Accept an inbound message from the sidecar.
///
/// Acknowledges immediately; the dispatcher runs on its own task so slow
/// turns never stall the sidecar's delivery loop.
async fn inbound_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<InboundMessage>,
) -> Response {
    if let Some(expected) = &state.sidecar_shared_secret {
        let provided = headers
            .get(SIDECAR_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    detail: "Invalid sidecar secret",
                }),
            )
                .into_response();
        }
    }

    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move {
        dispatcher.process(payload).await;
    });

    Json(InboundAccepted { accepted: true }).into_response()
}

/// Serve the gateway on the configured address until shutdown.
pub async fn serve(settings: &Settings, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let state = AppState {
        dispatcher,
        sidecar_shared_secret: settings.sidecar_shared_secret.clone(),
    };
    let app = build_app(state);

    let addr = format!("{}:{}", settings.app_host, settings.app_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "courier gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Wire up storage, the Codex subprocess, and the dispatcher, then serve.
pub async fn start_gateway(settings: Settings) -> anyhow::Result<()> {
    let store = SessionStore::connect(&settings.database_path).await?;

    let codex = Arc::new(AppServerClient::new(AppServerConfig {
        bin: settings.codex_bin.clone(),
        client_name: settings.codex_client_name.clone(),
        model: settings.codex_model.clone(),
        cwd: settings.codex_cwd.clone(),
    }));
    codex.start().await?;

    let service = ChatService::new(store, Arc::clone(&codex) as Arc<dyn CodexClient>);
    let sidecar = SidecarClient::new(&settings.sidecar_url, settings.sidecar_shared_secret.clone());
    let dispatcher = Arc::new(Dispatcher::new(
        service,
        sidecar,
        ChatLocks::default(),
        settings.access_mode,
        settings.approved_sender_identities(),
    ));

    serve(&settings, dispatcher).await
}
