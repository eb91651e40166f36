//! Redis 消息存储
//!
//! 键格式 `{prefix}:{low}:{high}`，值为消息的 JSON 编码。

use application::{MessageStore, StoreError};
use async_trait::async_trait;
use domain::{Identity, Message, ThreadKey};
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{debug, info};

use super::error::{RedisError, RedisResult};

pub struct RedisMessageStore {
    connection: ConnectionManager,
    key_prefix: String,
    max_per_thread: usize,
}

impl RedisMessageStore {
    /// 连接 Redis 并创建存储
    ///
    /// 连接断开后由 `ConnectionManager` 自动重连。
    pub async fn connect(url: &str, key_prefix: &str, max_per_thread: usize) -> RedisResult<Self> {
        let client = Client::open(url).map_err(|e| RedisError::ConfigError {
            message: format!("创建 Redis 客户端失败: {}", e),
        })?;
        let connection = ConnectionManager::new(client).await?;

        info!(key_prefix, max_per_thread, "Redis 消息存储已连接");

        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
            max_per_thread: max_per_thread.max(1),
        })
    }

    fn thread_key(&self, key: &ThreadKey) -> String {
        thread_key(&self.key_prefix, key)
    }

    async fn push(&self, message: &Message) -> RedisResult<()> {
        let key = self.thread_key(&message.thread_key());
        let encoded = serde_json::to_string(message).map_err(|e| RedisError::SerializationError {
            message: e.to_string(),
        })?;
        let keep_from = -(self.max_per_thread as i64);

        let mut conn = self.connection.clone();
        redis::pipe()
            .atomic()
            .cmd("RPUSH")
            .arg(&key)
            .arg(encoded)
            .ignore()
            .cmd("LTRIM")
            .arg(&key)
            .arg(keep_from)
            .arg(-1)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(key = %key, "消息已写入 Redis");
        Ok(())
    }

    async fn range(&self, key: &ThreadKey) -> RedisResult<Vec<Message>> {
        let key = self.thread_key(key);
        let mut conn = self.connection.clone();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(&key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        decode_thread(&raw)
    }
}

/// 计算线程在 Redis 中的键；身份中的 `\` 与 `:` 会被转义
pub fn thread_key(prefix: &str, key: &ThreadKey) -> String {
    let (low, high) = key.participants();
    format!("{}:{}:{}", prefix, escape(low), escape(high))
}

fn escape(identity: &Identity) -> String {
    identity.as_str().replace('\\', "\\\\").replace(':', "\\:")
}

/// 解码列表内容并按时间戳稳定排序
fn decode_thread(raw: &[String]) -> RedisResult<Vec<Message>> {
    let mut messages = raw
        .iter()
        .map(|entry| {
            serde_json::from_str::<Message>(entry).map_err(|e| RedisError::DeserializationError {
                message: e.to_string(),
            })
        })
        .collect::<RedisResult<Vec<_>>>()?;
    messages.sort_by_key(|m| m.timestamp);
    Ok(messages)
}

#[async_trait]
impl MessageStore for RedisMessageStore {
    async fn append(&self, message: Message) -> Result<(), StoreError> {
        self.push(&message).await.map_err(StoreError::from)
    }

    async fn thread(&self, key: &ThreadKey) -> Result<Vec<Message>, StoreError> {
        self.range(key).await.map_err(StoreError::from)
    }
}
