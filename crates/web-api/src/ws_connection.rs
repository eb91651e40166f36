use application::{ApplicationError, HubHandle};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientEvent, ConnectionId, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

/// WebSocket 连接
///
/// 一条传输连接对应一个网关会话。读任务把文本帧解码成客户端事件交给事件循环，
/// 写任务把会话出站事件编码成文本帧写回；任意一端结束即视为断开。
pub struct WebSocketConnection {
    connection_id: ConnectionId,
    hub: HubHandle,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl WebSocketConnection {
    /// 在事件循环中登记会话
    pub fn new(connection_id: ConnectionId, hub: HubHandle) -> Result<Self, ApplicationError> {
        let events = hub.connect(connection_id)?;
        tracing::info!(connection_id = %connection_id, "WebSocket 连接已建立");
        Ok(Self {
            connection_id,
            hub,
            events,
        })
    }

    pub async fn run(self, socket: WebSocket) {
        let Self {
            connection_id,
            hub,
            mut events,
        } = self;

        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        match cmd {
                            WsCommand::SendPong(data) => {
                                if sender.send(WsMessage::Pong(data.into())).await.is_err() {
                                    tracing::warn!("Failed to send pong message");
                                    break;
                                }
                            }
                        }
                    }
                    event = events.recv() => {
                        let Some(event) = event else {
                            // 事件循环已丢弃该会话
                            let _ = sender.send(WsMessage::Close(None)).await;
                            break;
                        };
                        let payload = match event.to_json() {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, event = event.name(), "failed to serialize websocket payload");
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            tracing::warn!("Failed to send text message");
                            break;
                        }
                    }
                }
            }
            tracing::debug!("WebSocket发送任务结束");
        });

        // 接收任务：处理来自WebSocket客户端的消息
        let mut recv_task = {
            let hub = hub.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    if Self::handle_incoming(connection_id, &hub, message, &cmd_tx)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                tracing::debug!("WebSocket接收任务结束");
            })
        };

        // 等待任意一个任务完成（连接断开）
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        if let Err(err) = hub.disconnect(connection_id) {
            tracing::warn!(connection_id = %connection_id, error = %err, "Failed to release session");
        }
        tracing::info!(connection_id = %connection_id, "WebSocket连接已断开");
    }

    /// 处理来自客户端的帧
    ///
    /// 无法解码的帧直接丢弃，不回复错误。
    async fn handle_incoming(
        connection_id: ConnectionId,
        hub: &HubHandle,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        let text = match &message {
            WsMessage::Close(_) => {
                tracing::debug!(connection_id = %connection_id, "WebSocket收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx
                    .send(WsCommand::SendPong(data.to_vec()))
                    .await
                    .is_err()
                {
                    tracing::warn!("Failed to send pong command");
                    return Err(());
                }
                return Ok(());
            }
            WsMessage::Pong(_) => return Ok(()),
            WsMessage::Text(text) => text.as_str(),
            WsMessage::Binary(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    tracing::debug!(connection_id = %connection_id, "ignoring non-utf8 binary frame");
                    return Ok(());
                }
            },
        };

        match ClientEvent::decode(text) {
            Ok(event) => {
                tracing::trace!(connection_id = %connection_id, event = event.name(), "收到客户端事件");
                hub.dispatch(connection_id, event).map_err(|err| {
                    tracing::warn!(connection_id = %connection_id, error = %err, "gateway hub unavailable");
                })
            }
            Err(err) => {
                tracing::debug!(connection_id = %connection_id, error = %err, "ignoring malformed frame");
                Ok(())
            }
        }
    }
}

/// WebSocket 控制帧写命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
