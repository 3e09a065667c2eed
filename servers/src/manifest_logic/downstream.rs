use crate::manifest_logic::config::Config;
use crate::manifest_logic::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Form, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use lib_common::core::SourceChangeFlags;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/setconfig", get(set_config_handler).post(set_config_form_handler))
        .route("/setjumprun", post(set_jumprun_handler))
        .route("/resetjumprun", post(reset_jumprun_handler))
        .with_state(app_state)
}

pub async fn run(config: Config, app_state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Downstream server listening on {}", addr);

    axum::serve(listener, router(app_state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            log::info!("Downstream server shutting down.");
        })
        .await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn set_config_handler(
    State(state): State<AppState>,
    Query(values): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    apply_options(&state, &values)
}

async fn set_config_form_handler(
    State(state): State<AppState>,
    Form(values): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    apply_options(&state, &values)
}

fn apply_options(state: &AppState, values: &HashMap<String, String>) -> (StatusCode, Json<serde_json::Value>) {
    let settings = state.dropzone.settings();
    let changed = settings.set_options_from_values(values);
    if changed {
        if let Err(e) = settings.write_options() {
            log::error!("cannot save options: {}", e);
        }
        state.dropzone.wake(SourceChangeFlags::OPTIONS);
    }
    (StatusCode::OK, Json(json!({ "changed": changed })))
}

async fn set_jumprun_handler(
    State(state): State<AppState>,
    Form(values): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(jumprun) = state.dropzone.jumprun() else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "jump run is not enabled" })));
    };
    if let Err(e) = jumprun.set_from_values(&values) {
        log::warn!("rejected jump run update: {}", e);
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })));
    }
    if let Err(e) = jumprun.write() {
        log::error!("cannot save jumprun state: {}", e);
    }
    (StatusCode::OK, Json(json!({ "jumprun": jumprun.jumprun() })))
}

async fn reset_jumprun_handler(State(state): State<AppState>) -> impl IntoResponse {
    let Some(jumprun) = state.dropzone.jumprun() else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "jump run is not enabled" })));
    };
    jumprun.reset();
    if let Err(e) = jumprun.write() {
        log::error!("cannot save jumprun state: {}", e);
    }
    (StatusCode::OK, Json(json!({ "jumprun": jumprun.jumprun() })))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (client_id, mut updates) = match state.dispatcher.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            log::warn!("Cannot register client: {}", e);
            return;
        }
    };
    log::info!("Client {} connected", client_id);

    loop {
        tokio::select! {
            // Handle incoming messages from the client
            msg = socket.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            // Forward updates from the dispatcher
            update = updates.recv() => {
                let Some(update) = update else {
                    // Evicted or the dispatcher stopped
                    break;
                };
                match serde_json::to_string(update.as_ref()) {
                    Ok(json_str) => {
                        if socket.send(Message::Text(json_str.into())).await.is_err() {
                            break; // client disconnected
                        }
                    }
                    Err(e) => log::error!("Cannot encode update for client {}: {}", client_id, e),
                }
            }
        }
    }

    state.dispatcher.remove_client(client_id);
    log::info!("Client {} disconnected", client_id);
}
