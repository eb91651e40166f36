use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use domain::{ConnectionId, Identity, Message};
use serde::Deserialize;

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    user_id: Option<String>,
    partner_id: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/online", get(online_identities))
        .route("/messages", get(get_history))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn online_identities(
    State(state): State<AppState>,
) -> Result<Json<Vec<Identity>>, ApiError> {
    let online = state.hub.online_identities().await?;
    Ok(Json(online))
}

/// 与网关 `get-messages` 相同的查询；存储故障时返回空数组
async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let user_id = Identity::parse(query.user_id.unwrap_or_default())
        .map_err(|_| ApiError::bad_request("userId is required"))?;
    let partner_id = Identity::parse(query.partner_id.unwrap_or_default())
        .map_err(|_| ApiError::bad_request("partnerId is required"))?;

    let messages = state.history.get_history(&user_id, &partner_id).await;
    Ok(Json(messages))
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let connection_id = ConnectionId::new();
    ws.on_upgrade(move |socket| async move {
        match WebSocketConnection::new(connection_id, state.hub) {
            Ok(connection) => connection.run(socket).await,
            Err(err) => {
                tracing::error!(connection_id = %connection_id, error = %err, "failed to register websocket session");
            }
        }
    })
}
