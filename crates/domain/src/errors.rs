//! 领域模型错误定义
//!
//! 网关边界上的输入校验与帧解码错误。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 字段缺失或取值非法
    #[error("参数无效: {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 客户端发送了无法识别的事件名
    #[error("未知事件: {event}")]
    UnknownEvent { event: String },

    /// 帧不是合法的 JSON 信封
    #[error("帧格式错误: {message}")]
    MalformedFrame { message: String },
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_event(event: impl Into<String>) -> Self {
        Self::UnknownEvent {
            event: event.into(),
        }
    }

    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
