#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    GatewayHub, GatewayHubDependencies, HistoryService, HubHandle, MemoryMessageStore,
    SystemClock,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use web_api::{router, AppState};

const WAIT: Duration = Duration::from_secs(3);

pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: HubHandle,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/api/v1/ws", self.addr)
    }

    pub async fn online(&self) -> Vec<String> {
        self.hub
            .online_identities()
            .await
            .expect("hub running")
            .into_iter()
            .map(|identity| identity.as_str().to_string())
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.hub.shutdown();
    }
}

/// 在随机端口上启动完整的网关（内存历史存储）
pub async fn spawn_server() -> TestServer {
    let history = Arc::new(HistoryService::new(Arc::new(MemoryMessageStore::default())));
    let (hub, _task) = GatewayHub::spawn(GatewayHubDependencies {
        history: history.clone(),
        clock: Arc::new(SystemClock),
        presence_batch_limit: 64,
        archive_messages: true,
    });

    let app = router(AppState::new(hub.clone(), history));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        hub,
        shutdown: Some(shutdown_tx),
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(server: &TestServer) -> Self {
        let (stream, _) = connect_async(server.ws_url()).await.expect("ws connect");
        Self { stream }
    }

    /// 连接并以给定身份 join
    pub async fn join(server: &TestServer, identity: &str) -> Self {
        let mut client = Self::connect(server).await;
        client.emit("join", json!(identity)).await;
        client
    }

    pub async fn emit(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.send_raw(&frame).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.stream
            .send(Message::text(text.to_string()))
            .await
            .expect("ws send");
    }

    pub async fn send_message(&mut self, receiver: &str, payload: &str) {
        self.emit(
            "private-message",
            json!({ "receiverId": receiver, "payload": payload }),
        )
        .await;
    }

    /// 下一个服务端事件：`(event, data)`
    pub async fn next_event(&mut self) -> (String, Value) {
        loop {
            let frame = timeout(WAIT, self.stream.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("ws error");
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(text.as_str()).expect("json frame");
                let event = value["event"].as_str().expect("event name").to_string();
                return (event, value.get("data").cloned().unwrap_or(Value::Null));
            }
        }
    }

    /// 跳过其他事件，直到收到指定事件
    pub async fn expect(&mut self, event: &str) -> Value {
        loop {
            let (name, data) = self.next_event().await;
            if name == event {
                return data;
            }
        }
    }

    /// 等到某个 online-users 快照等于期望值
    pub async fn expect_online(&mut self, expected: &[&str]) {
        loop {
            let data = self.expect("online-users").await;
            let list: Vec<String> = serde_json::from_value(data).expect("identity list");
            if list == expected {
                return;
            }
        }
    }

    /// 发送 ping，返回 pong 之前收到的所有事件
    pub async fn drain_until_pong(&mut self) -> Vec<(String, Value)> {
        self.emit("ping", Value::Null).await;
        let mut seen = Vec::new();
        loop {
            let (name, data) = self.next_event().await;
            if name == "pong" {
                return seen;
            }
            seen.push((name, data));
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
