use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value_objects::{Identity, Payload, Timestamp};

/// 一条点对点消息，创建后不可变。
///
/// 不校验 `sender_id != receiver_id`，允许发给自己。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender_id: Identity,
    pub receiver_id: Identity,
    pub payload: Payload,
    pub timestamp: Timestamp,
}

impl Message {
    pub fn new(
        sender_id: Identity,
        receiver_id: Identity,
        payload: Payload,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            sender_id,
            receiver_id,
            payload,
            timestamp,
        }
    }

    /// 消息所属会话线程
    pub fn thread_key(&self) -> ThreadKey {
        ThreadKey::between(self.sender_id.clone(), self.receiver_id.clone())
    }
}

/// 会话线程键：两个身份的无序对。
///
/// `between(a, b)` 与 `between(b, a)` 相等，内部按字典序保存。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadKey {
    low: Identity,
    high: Identity,
}

impl ThreadKey {
    pub fn between(a: Identity, b: Identity) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn participants(&self) -> (&Identity, &Identity) {
        (&self.low, &self.high)
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.low, self.high)
    }
}
