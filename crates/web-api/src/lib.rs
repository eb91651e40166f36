//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 网关入口，以及在线列表和历史查询的 HTTP 接口。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
pub use ws_connection::WebSocketConnection;
