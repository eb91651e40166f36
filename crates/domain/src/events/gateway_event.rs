//! 网关线路协议
//!
//! 每个文本帧都是 `{"event": <名称>, "data": <载荷>}` 形式的 JSON 信封。
//! 客户端事件在这里完成形状校验，缺字段或空字段的帧直接返回错误，
//! 由会话边界静默丢弃。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DomainError, DomainResult};
use crate::message::Message;
use crate::value_objects::{Identity, Payload, Timestamp};

/// 客户端 -> 服务端事件（已校验）
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// 自报身份，加入在线列表
    Join { identity: Identity },
    /// 显式离开，不关闭传输
    Leave,
    /// 私聊消息
    PrivateMessage(OutgoingMessage),
    /// 请求两人之间的历史消息
    GetMessages {
        user_id: Identity,
        partner_id: Identity,
    },
    /// 应用层心跳
    Ping,
}

/// 客户端提交的待投递消息，尚未打时间戳。
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    /// 缺省时使用会话当前身份
    pub sender_id: Option<Identity>,
    pub receiver_id: Identity,
    pub payload: Payload,
}

impl OutgoingMessage {
    /// 补全发送方并打上时间戳
    pub fn into_message(self, session_identity: &Identity, timestamp: Timestamp) -> Message {
        let sender_id = self
            .sender_id
            .unwrap_or_else(|| session_identity.clone());
        Message::new(sender_id, self.receiver_id, self.payload, timestamp)
    }
}

/// 服务端 -> 客户端事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// 在线身份快照
    OnlineUsers(Vec<Identity>),
    /// 投递一条消息
    ReceiveMessage(Message),
    /// 历史消息批量回复
    ChatHistory(Vec<Message>),
    /// 心跳回复
    Pong,
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => "online-users",
            ServerEvent::ReceiveMessage(_) => "receive-message",
            ServerEvent::ChatHistory(_) => "chat-history",
            ServerEvent::Pong => "pong",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrivateMessageData {
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    receiver_id: Option<String>,
    #[serde(default, alias = "encryptedMessage")]
    payload: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetMessagesData {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    partner_id: Option<String>,
}

impl ClientEvent {
    /// 解码并校验一个文本帧
    pub fn decode(text: &str) -> DomainResult<Self> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|err| DomainError::malformed_frame(err.to_string()))?;

        match envelope.event.as_str() {
            "join" => {
                let identity = match envelope.data {
                    Value::String(value) => Identity::parse(value)?,
                    _ => return Err(DomainError::invalid_argument("identity", "must be a string")),
                };
                Ok(ClientEvent::Join { identity })
            }
            "leave" => Ok(ClientEvent::Leave),
            "private-message" => {
                let data: PrivateMessageData = object_data(envelope.data)?;
                let sender_id = match data.sender_id {
                    Some(value) if !value.is_empty() => Some(Identity::parse(value)?),
                    _ => None,
                };
                Ok(ClientEvent::PrivateMessage(OutgoingMessage {
                    sender_id,
                    receiver_id: Identity::parse(required("receiverId", data.receiver_id)?)?,
                    payload: Payload::new(required("payload", data.payload)?)?,
                }))
            }
            "get-messages" => {
                let data: GetMessagesData = object_data(envelope.data)?;
                Ok(ClientEvent::GetMessages {
                    user_id: Identity::parse(required("userId", data.user_id)?)?,
                    partner_id: Identity::parse(required("partnerId", data.partner_id)?)?,
                })
            }
            "ping" => Ok(ClientEvent::Ping),
            other => Err(DomainError::unknown_event(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "join",
            ClientEvent::Leave => "leave",
            ClientEvent::PrivateMessage(_) => "private-message",
            ClientEvent::GetMessages { .. } => "get-messages",
            ClientEvent::Ping => "ping",
        }
    }
}

fn object_data<T>(data: Value) -> DomainResult<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match data {
        Value::Null => Ok(T::default()),
        Value::Object(_) => serde_json::from_value(data)
            .map_err(|err| DomainError::malformed_frame(err.to_string())),
        _ => Err(DomainError::malformed_frame("data must be an object")),
    }
}

fn required<T>(field: &str, value: Option<T>) -> DomainResult<T> {
    value.ok_or_else(|| DomainError::invalid_argument(field, "is required"))
}
