//! 在线状态广播
//!
//! 注册表成员变化后标记待广播；事件循环在一个 tick 结束时统一 flush，
//! 把同一 tick 内的多次变化合并成一次推送。

use domain::ServerEvent;

use crate::registry::ConnectionRegistry;
use crate::session::SessionTable;

#[derive(Debug, Default)]
pub struct PresenceBroadcaster {
    pending: bool,
    broadcasts: u64,
}

impl PresenceBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_changed(&mut self) {
        self.pending = true;
    }

    /// 已执行的广播次数
    pub fn broadcasts(&self) -> u64 {
        self.broadcasts
    }

    /// 有待广播的变化时推送一次，返回送达的会话数
    pub fn flush(&mut self, registry: &ConnectionRegistry, sessions: &SessionTable) -> usize {
        if !self.pending {
            return 0;
        }
        self.pending = false;
        self.broadcast(registry, sessions)
    }

    /// 向每个未关闭的会话推送在线列表（不含其自身身份）
    pub fn broadcast(&mut self, registry: &ConnectionRegistry, sessions: &SessionTable) -> usize {
        let online = registry.list_identities(None);
        self.broadcasts += 1;

        let mut reached = 0;
        for session in sessions.values() {
            if session.is_closed() {
                continue;
            }
            let own = session.identity();
            let snapshot = online
                .iter()
                .filter(|identity| Some(*identity) != own)
                .cloned()
                .collect();
            if session.deliver(ServerEvent::OnlineUsers(snapshot)) {
                reached += 1;
            } else {
                tracing::debug!(connection_id = %session.id(), "skipping presence update for gone session");
            }
        }

        tracing::debug!(online = online.len(), reached, "在线列表已广播");
        reached
    }
}
