//! 网关会话状态机
//!
//! `Unidentified -> Identified -> Closed`，`Closed` 为终态。
//! 会话独占自己的出站通道；注册表只保存身份到连接 ID 的映射。

use std::collections::HashMap;

use domain::{ConnectionId, Identity, ServerEvent};
use tokio::sync::mpsc;

use crate::error::ApplicationError;

/// 会话出站通道
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// 事件循环持有的全部会话
pub type SessionTable = HashMap<ConnectionId, GatewaySession>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// 已连接，尚未 join
    Unidentified,
    /// 已 join，携带自报身份
    Identified(Identity),
    /// 已离开或断开
    Closed,
}

#[derive(Debug)]
pub struct GatewaySession {
    id: ConnectionId,
    state: SessionState,
    outbox: Outbox,
}

impl GatewaySession {
    pub fn new(id: ConnectionId, outbox: Outbox) -> Self {
        Self {
            id,
            state: SessionState::Unidentified,
            outbox,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Identified(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// join：进入（或保持）已识别状态，返回之前的身份
    pub fn identify(&mut self, identity: Identity) -> Result<Option<Identity>, ApplicationError> {
        match std::mem::replace(&mut self.state, SessionState::Identified(identity)) {
            SessionState::Unidentified => Ok(None),
            SessionState::Identified(previous) => Ok(Some(previous)),
            SessionState::Closed => {
                self.state = SessionState::Closed;
                Err(ApplicationError::SessionClosed(self.id))
            }
        }
    }

    /// 发送消息、请求历史等操作要求已识别
    pub fn require_identity(&self) -> Result<&Identity, ApplicationError> {
        match &self.state {
            SessionState::Identified(identity) => Ok(identity),
            SessionState::Unidentified => Err(ApplicationError::NotIdentified(self.id)),
            SessionState::Closed => Err(ApplicationError::SessionClosed(self.id)),
        }
    }

    /// 进入终态；重复关闭是空操作
    pub fn close(&mut self) -> Option<Identity> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Identified(identity) => Some(identity),
            _ => None,
        }
    }

    /// 尽力投递；会话已关闭或对端已断开时返回 `false`
    pub fn deliver(&self, event: ServerEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        self.outbox.send(event).is_ok()
    }
}
