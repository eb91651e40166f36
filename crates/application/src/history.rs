//! 历史消息服务
//!
//! 历史由外部持久化协作者保存，这里只负责转发查询并把结果整批返回。
//! 存储故障不向上传播：请求方拿到空批次，其他会话不受影响。

use std::sync::Arc;

use async_trait::async_trait;
use domain::{Identity, Message, ThreadKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record in message store: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

/// 消息持久化协作者
///
/// `thread` 必须按时间戳非递减顺序返回，且对两个参与者的顺序不敏感。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: Message) -> Result<(), StoreError>;

    async fn thread(&self, key: &ThreadKey) -> Result<Vec<Message>, StoreError>;
}

pub struct HistoryService {
    store: Arc<dyn MessageStore>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// 两个身份之间的历史；未知身份或存储故障都返回空序列
    pub async fn get_history(&self, a: &Identity, b: &Identity) -> Vec<Message> {
        let key = ThreadKey::between(a.clone(), b.clone());
        match self.store.thread(&key).await {
            Ok(messages) => {
                tracing::debug!(thread = %key, count = messages.len(), "历史消息已加载");
                messages
            }
            Err(err) => {
                tracing::warn!(thread = %key, error = %err, "failed to load chat history");
                Vec::new()
            }
        }
    }

    /// 路由之外的保存路径
    pub async fn record(&self, message: Message) -> Result<(), StoreError> {
        self.store.append(message).await
    }
}

/// 内存实现的消息存储（默认后端，也用于测试）
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    pub struct MemoryMessageStore {
        threads: RwLock<HashMap<ThreadKey, Vec<Message>>>,
        max_per_thread: usize,
    }

    impl Default for MemoryMessageStore {
        fn default() -> Self {
            Self::new(500)
        }
    }

    impl MemoryMessageStore {
        pub fn new(max_per_thread: usize) -> Self {
            Self {
                threads: RwLock::new(HashMap::new()),
                max_per_thread: max_per_thread.max(1),
            }
        }
    }

    #[async_trait]
    impl MessageStore for MemoryMessageStore {
        async fn append(&self, message: Message) -> Result<(), StoreError> {
            let mut threads = self.threads.write().await;
            let thread = threads.entry(message.thread_key()).or_default();

            // 同一时间戳保持到达顺序
            let position = thread.partition_point(|m| m.timestamp <= message.timestamp);
            thread.insert(position, message);

            if thread.len() > self.max_per_thread {
                let overflow = thread.len() - self.max_per_thread;
                thread.drain(..overflow);
            }
            Ok(())
        }

        async fn thread(&self, key: &ThreadKey) -> Result<Vec<Message>, StoreError> {
            let threads = self.threads.read().await;
            Ok(threads.get(key).cloned().unwrap_or_default())
        }
    }
}
