//! 网关事件循环
//!
//! 单个任务独占注册表与会话表，所有连接生命周期事件都作为命令进入同一个
//! 队列，按到达顺序逐条执行到底，不需要任何锁。
//!
//! 唯一的让出点是查询历史：查询在独立任务里进行，结果作为新命令回到队列，
//! 届时若请求方会话已不存在或已关闭，就直接丢弃。
//!
//! 保存走另一条单向通道：只有一个写入任务按路由顺序逐条落盘，
//! 同一毫秒内的消息在存储里也保持到达顺序。

use std::ops::ControlFlow;
use std::sync::Arc;

use domain::{ClientEvent, ConnectionId, Identity, Message, ServerEvent, ThreadKey};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::history::HistoryService;
use crate::presence::PresenceBroadcaster;
use crate::registry::ConnectionRegistry;
use crate::router::{MessageRouter, RouteOutcome};
use crate::session::{GatewaySession, Outbox, SessionTable};

/// 事件循环命令
#[derive(Debug)]
pub enum HubCommand {
    /// 新传输连接建立
    Connect {
        connection_id: ConnectionId,
        outbox: Outbox,
    },
    /// 来自客户端的已校验事件
    Client {
        connection_id: ConnectionId,
        event: ClientEvent,
    },
    /// 传输连接关闭
    Disconnect { connection_id: ConnectionId },
    /// 历史查询完成，回到事件循环投递
    HistoryReady {
        connection_id: ConnectionId,
        thread: ThreadKey,
        messages: Vec<Message>,
    },
    /// 读取在线身份快照
    OnlineIdentities {
        reply: oneshot::Sender<Vec<Identity>>,
    },
    /// 停止事件循环并拆除注册表
    Shutdown,
}

/// 事件循环的可克隆句柄
#[derive(Clone, Debug)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    fn send(&self, command: HubCommand) -> Result<(), ApplicationError> {
        self.commands
            .send(command)
            .map_err(|_| ApplicationError::HubUnavailable)
    }

    /// 登记新连接，返回该连接的出站事件流
    pub fn connect(
        &self,
        connection_id: ConnectionId,
    ) -> Result<mpsc::UnboundedReceiver<ServerEvent>, ApplicationError> {
        let (outbox, events) = mpsc::unbounded_channel();
        self.send(HubCommand::Connect {
            connection_id,
            outbox,
        })?;
        Ok(events)
    }

    pub fn dispatch(
        &self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), ApplicationError> {
        self.send(HubCommand::Client {
            connection_id,
            event,
        })
    }

    pub fn disconnect(&self, connection_id: ConnectionId) -> Result<(), ApplicationError> {
        self.send(HubCommand::Disconnect { connection_id })
    }

    pub async fn online_identities(&self) -> Result<Vec<Identity>, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.send(HubCommand::OnlineIdentities { reply })?;
        response.await.map_err(|_| ApplicationError::HubUnavailable)
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(HubCommand::Shutdown);
    }
}

pub struct GatewayHubDependencies {
    pub history: Arc<HistoryService>,
    pub clock: Arc<dyn Clock>,
    /// 每个 tick 最多合并处理的命令数
    pub presence_batch_limit: usize,
    /// 路由后是否交给存储保存
    pub archive_messages: bool,
}

pub struct GatewayHub {
    registry: ConnectionRegistry,
    sessions: SessionTable,
    presence: PresenceBroadcaster,
    router: MessageRouter,
    history: Arc<HistoryService>,
    clock: Arc<dyn Clock>,
    batch_limit: usize,
    archive_messages: bool,
    archiver: Option<mpsc::UnboundedSender<Message>>,
    commands: mpsc::UnboundedReceiver<HubCommand>,
    reentry: mpsc::WeakUnboundedSender<HubCommand>,
}

impl GatewayHub {
    pub fn new(deps: GatewayHubDependencies) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            registry: ConnectionRegistry::new(),
            sessions: SessionTable::new(),
            presence: PresenceBroadcaster::new(),
            router: MessageRouter::new(),
            history: deps.history,
            clock: deps.clock,
            batch_limit: deps.presence_batch_limit.max(1),
            archive_messages: deps.archive_messages,
            archiver: None,
            commands: rx,
            reentry: tx.downgrade(),
        };
        (hub, HubHandle { commands: tx })
    }

    /// 创建并在后台运行事件循环
    pub fn spawn(deps: GatewayHubDependencies) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(deps);
        (handle, tokio::spawn(hub.run()))
    }

    pub async fn run(mut self) {
        info!("网关事件循环启动");

        let writer = self.archive_messages.then(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            self.archiver = Some(tx);
            tokio::spawn(archive_writer(Arc::clone(&self.history), rx))
        });

        'ticks: while let Some(command) = self.commands.recv().await {
            let mut stop = self.handle(command).is_break();
            let mut processed = 1;

            while !stop && processed < self.batch_limit {
                match self.commands.try_recv() {
                    Ok(command) => {
                        stop = self.handle(command).is_break();
                        processed += 1;
                    }
                    Err(_) => break,
                }
            }

            self.presence.flush(&self.registry, &self.sessions);

            if stop {
                break 'ticks;
            }
        }

        self.teardown();

        // 发送端已在 teardown 中释放，写入任务清空队列后退出
        if let Some(writer) = writer {
            if let Err(err) = writer.await {
                warn!(error = %err, "archive writer aborted");
            }
        }
    }

    fn handle(&mut self, command: HubCommand) -> ControlFlow<()> {
        match command {
            HubCommand::Connect {
                connection_id,
                outbox,
            } => {
                debug!(connection_id = %connection_id, "会话已连接");
                self.sessions
                    .insert(connection_id, GatewaySession::new(connection_id, outbox));
            }
            HubCommand::Client {
                connection_id,
                event,
            } => {
                let name = event.name();
                if let Err(err) = self.handle_client(connection_id, event) {
                    debug!(connection_id = %connection_id, event = name, error = %err, "ignoring client event");
                }
            }
            HubCommand::Disconnect { connection_id } => self.handle_disconnect(connection_id),
            HubCommand::HistoryReady {
                connection_id,
                thread,
                messages,
            } => self.handle_history_ready(connection_id, thread, messages),
            HubCommand::OnlineIdentities { reply } => {
                let _ = reply.send(self.registry.list_identities(None));
            }
            HubCommand::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn handle_client(
        &mut self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), ApplicationError> {
        let session = self
            .sessions
            .get_mut(&connection_id)
            .ok_or(ApplicationError::SessionNotFound(connection_id))?;

        match event {
            ClientEvent::Join { identity } => {
                let previous = session.identify(identity.clone())?;
                let registration = self.registry.register(identity.clone(), connection_id);
                if let Some(superseded) = registration.superseded {
                    info!(identity = %identity, superseded = %superseded, "身份被新连接顶替");
                }
                info!(connection_id = %connection_id, identity = %identity, previous = ?previous, "会话已加入");
                self.presence.mark_changed();
            }
            ClientEvent::Leave => {
                session.close();
                self.release(connection_id);
                info!(connection_id = %connection_id, "会话已离开");
            }
            ClientEvent::PrivateMessage(outgoing) => {
                let identity = session.require_identity()?;
                let message = outgoing.into_message(identity, self.clock.now());
                let archived = self.archiver.is_some().then(|| message.clone());

                match self.router.route(&self.registry, &self.sessions, message) {
                    RouteOutcome::Delivered(target) => {
                        debug!(connection_id = %connection_id, target = %target, "消息已投递");
                    }
                    RouteOutcome::Undeliverable => {
                        debug!(connection_id = %connection_id, "receiver offline, message dropped");
                    }
                }

                if let Some(message) = archived {
                    self.archive(message);
                }
            }
            ClientEvent::GetMessages {
                user_id,
                partner_id,
            } => {
                session.require_identity()?;
                self.request_history(connection_id, user_id, partner_id);
            }
            ClientEvent::Ping => {
                if !session.deliver(ServerEvent::Pong) {
                    return Err(ApplicationError::SessionClosed(connection_id));
                }
            }
        }
        Ok(())
    }

    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        if let Some(mut session) = self.sessions.remove(&connection_id) {
            session.close();
        }
        self.release(connection_id);
        debug!(connection_id = %connection_id, "会话已断开");
    }

    /// 注销该连接的身份；只有真的移除了映射才广播
    fn release(&mut self, connection_id: ConnectionId) {
        if let Some(identity) = self.registry.unregister(connection_id) {
            info!(connection_id = %connection_id, identity = %identity, "身份已下线");
            self.presence.mark_changed();
        }
    }

    fn request_history(&self, connection_id: ConnectionId, user_id: Identity, partner_id: Identity) {
        let Some(reentry) = self.reentry.upgrade() else {
            return;
        };
        let history = Arc::clone(&self.history);
        tokio::spawn(async move {
            let messages = history.get_history(&user_id, &partner_id).await;
            let thread = ThreadKey::between(user_id, partner_id);
            let _ = reentry.send(HubCommand::HistoryReady {
                connection_id,
                thread,
                messages,
            });
        });
    }

    fn handle_history_ready(
        &mut self,
        connection_id: ConnectionId,
        thread: ThreadKey,
        messages: Vec<Message>,
    ) {
        let count = messages.len();
        match self.sessions.get(&connection_id) {
            Some(session) if session.deliver(ServerEvent::ChatHistory(messages)) => {
                debug!(connection_id = %connection_id, thread = %thread, count, "历史消息已回复");
            }
            _ => {
                debug!(connection_id = %connection_id, thread = %thread, "requester gone, discarding history");
            }
        }
    }

    fn archive(&self, message: Message) {
        let Some(archiver) = &self.archiver else {
            return;
        };
        if archiver.send(message).is_err() {
            warn!("archive writer is gone, message not archived");
        }
    }

    fn teardown(&mut self) {
        for session in self.sessions.values_mut() {
            session.close();
        }
        self.sessions.clear();
        let online = self.registry.len();
        self.registry.clear();
        self.archiver = None;
        let stats = self.router.stats();
        info!(
            online,
            routed = stats.routed,
            delivered = stats.delivered,
            dropped = stats.dropped,
            presence_broadcasts = self.presence.broadcasts(),
            "网关事件循环已停止"
        );
    }
}

/// 单个写入任务：按收到的顺序逐条保存，失败只记日志
async fn archive_writer(history: Arc<HistoryService>, mut messages: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = messages.recv().await {
        if let Err(err) = history.record(message).await {
            warn!(error = %err, "failed to archive message");
        }
    }
    debug!("archive writer stopped");
}
