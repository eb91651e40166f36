use std::sync::Arc;

use application::{MemoryMessageStore, MessageStore};
use config::{HistoryBackend, HistoryConfig};
use thiserror::Error;

use crate::redis::{RedisError, RedisMessageStore};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("history backend `redis` requires history.redis_url")]
    MissingRedisUrl,
}

/// 按配置选择历史存储后端
pub async fn build_message_store(
    config: &HistoryConfig,
) -> Result<Arc<dyn MessageStore>, InfrastructureError> {
    match config.backend {
        HistoryBackend::Memory => {
            tracing::info!(
                max_messages_per_thread = config.max_messages_per_thread,
                "使用内存历史存储"
            );
            Ok(Arc::new(MemoryMessageStore::new(
                config.max_messages_per_thread,
            )))
        }
        HistoryBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or(InfrastructureError::MissingRedisUrl)?;
            let store = RedisMessageStore::connect(
                url,
                &config.key_prefix,
                config.max_messages_per_thread,
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}
