//! 连接注册表
//!
//! 维护「身份 -> 连接」与「连接 -> 身份」的双向映射。
//! 只有网关事件循环持有并修改它，因此这里不加锁。

use std::collections::{BTreeMap, HashMap};

use domain::{ConnectionId, Identity};

/// 一次注册带来的变化
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Registration {
    /// 该连接之前使用的另一个身份，已被释放
    pub released: Option<Identity>,
    /// 该身份之前所在的另一个连接，已被顶替
    pub superseded: Option<ConnectionId>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_identity: BTreeMap<Identity, ConnectionId>,
    by_connection: HashMap<ConnectionId, Identity>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或覆盖映射，后注册者胜出
    pub fn register(&mut self, identity: Identity, connection_id: ConnectionId) -> Registration {
        let mut registration = Registration::default();

        if let Some(previous) = self.by_connection.get(&connection_id) {
            if previous != &identity {
                let previous = previous.clone();
                self.by_identity.remove(&previous);
                registration.released = Some(previous);
            }
        }

        if let Some(previous) = self.by_identity.insert(identity.clone(), connection_id) {
            if previous != connection_id {
                self.by_connection.remove(&previous);
                registration.superseded = Some(previous);
            }
        }
        self.by_connection.insert(connection_id, identity);

        registration
    }

    /// 移除该连接拥有的映射；重复调用返回 `None`
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<Identity> {
        let identity = self.by_connection.remove(&connection_id)?;
        if self.by_identity.get(&identity) == Some(&connection_id) {
            self.by_identity.remove(&identity);
        }
        Some(identity)
    }

    pub fn resolve(&self, identity: &Identity) -> Option<ConnectionId> {
        self.by_identity.get(identity).copied()
    }

    /// 当前在线身份快照（有序），可排除调用方自己
    pub fn list_identities(&self, excluding: Option<&Identity>) -> Vec<Identity> {
        self.by_identity
            .keys()
            .filter(|identity| Some(*identity) != excluding)
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn clear(&mut self) {
        self.by_identity.clear();
        self.by_connection.clear();
    }
}
