//! 统一配置中心
//!
//! 提供网关的全局配置管理，包括：
//! - 监听地址
//! - 在线状态广播批处理
//! - 历史消息存储
//!
//! 加载优先级：默认值 -> 可选配置文件（`APP_CONFIG_FILE`）-> 环境变量（`APP_*`，
//! 嵌套字段用 `__` 分隔，例如 `APP_HISTORY__BACKEND=redis`）。

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// 服务配置
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
    /// 网关事件循环配置
    #[serde(default)]
    #[validate(nested)]
    pub gateway: GatewayConfig,
    /// 历史消息存储配置
    #[serde(default)]
    #[validate(nested)]
    pub history: HistoryConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3001,
            cors_origins: vec!["*".into()],
        }
    }
}

/// 网关配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// 单个事件循环 tick 内最多合并处理的命令数，之后才统一广播在线列表
    #[validate(range(min = 1, max = 10000))]
    pub presence_batch_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            presence_batch_limit: 64,
        }
    }
}

/// 历史消息存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Memory,
    Redis,
}

/// 历史消息配置
///
/// 缺省字段逐个回落到默认值，配置文件里只写 `backend` 与 `redis_url` 即可。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
    #[validate(url)]
    pub redis_url: Option<String>,
    #[validate(length(min = 1))]
    pub key_prefix: String,
    /// 每个会话线程最多保留的消息条数
    #[validate(range(min = 1))]
    pub max_messages_per_thread: usize,
    /// 路由后是否把消息交给存储
    pub archive_messages: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::Memory,
            redis_url: None,
            key_prefix: "chat".into(),
            max_messages_per_thread: 500,
            archive_messages: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            gateway: GatewayConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl AppConfig {
    /// 组装配置来源，不做提取
    pub fn figment() -> Figment {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(Env::prefixed("APP_").split("__"))
    }

    /// 按优先级加载并校验配置
    pub fn load() -> Result<Self, ConfigError> {
        let cfg: AppConfig = Self::figment().extract().map_err(Box::new)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// 字段校验加跨字段约束
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.history.backend == HistoryBackend::Redis && self.history.redis_url.is_none() {
            return Err(ConfigError::MissingRedisUrl);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 返回脱敏后的字符串表示（用于日志）
    pub fn sanitize(&self) -> String {
        let mut text = format!("{:?}", self);
        if let Some(start) = text.find("redis://") {
            let end = text[start..]
                .find('"')
                .map(|i| start + i)
                .unwrap_or(text.len());
            text.replace_range(start..end, "redis://[REDACTED]");
        }
        text
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("history backend `redis` requires history.redis_url")]
    MissingRedisUrl,
}
