//! 实时事件协议
//!
//! 每个 WebSocket 文本帧承载一个事件信封：`{"event": <名称>, "data": <负载>}`。
//! 事件名称和负载字段与浏览器端保持一致，不能随意修改。
//!
//! 入站帧先按信封解析，再按事件名解析负载，信封中 `event` 和 `data` 的先后顺序不影响结果。
//! WebRTC 信令以原始 JSON 文本保存，转发时逐字节原样写出。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::entities::PrivateMessage;
use crate::errors::DomainError;
use crate::value_objects::ConnectionId;

/// 系统通知使用的发送者名称
pub const SYSTEM_USERNAME: &str = "System";

/// 客户端发往服务端的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// 纯文本聊天，原样广播
    Message(String),
    /// 结构化聊天
    Json(ChatPayload),
    /// 加入私聊房间
    Join(RoomPayload),
    /// 离开私聊房间
    Leave(RoomPayload),
    /// 私信（持久化后投递）
    PrivateMessage(PrivateMessagePayload),
    /// 加入通话房间
    JoinCall(CallRoomPayload),
    /// WebRTC 信令，原样转发给另一方
    WebrtcSignal(SignalPayload),
    /// 主动离开通话
    LeaveCall(CallRoomPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPayload {
    pub username: String,
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessagePayload {
    pub room: String,
    pub message: String,
    pub sender: String,
    pub recipient: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRoomPayload {
    pub room: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub room: String,
    pub signal: Signal,
}

/// 不透明的协商负载（offer / answer / ice candidate）
///
/// 保存客户端发来的原始 JSON 文本，不解析数字、不调整键顺序。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signal(Box<RawValue>);

impl Signal {
    /// 从 JSON 文本构造；文本必须是合法的 JSON 值
    pub fn from_json(json: impl Into<String>) -> Result<Self, serde_json::Error> {
        RawValue::from_string(json.into()).map(Self)
    }

    /// 原始 JSON 文本
    pub fn get(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

/// 入站信封，负载留待按事件名解析
#[derive(Deserialize)]
struct Envelope {
    event: String,
    data: Option<Box<RawValue>>,
}

fn payload<T: DeserializeOwned>(event: &str, data: Option<&RawValue>) -> Result<T, DomainError> {
    let data = data.ok_or_else(|| DomainError::malformed(format!("{event}: missing data")))?;
    serde_json::from_str(data.get())
        .map_err(|err| DomainError::malformed(format!("{event}: {err}")))
}

impl ClientEvent {
    /// 解析一个文本帧；缺字段或未知事件都视为格式错误
    pub fn parse(text: &str) -> Result<Self, DomainError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|err| DomainError::malformed(err.to_string()))?;
        let event = envelope.event.as_str();
        let data = envelope.data.as_deref();

        Ok(match event {
            "message" => Self::Message(payload(event, data)?),
            "json" => Self::Json(payload(event, data)?),
            "join" => Self::Join(payload(event, data)?),
            "leave" => Self::Leave(payload(event, data)?),
            "private_message" => Self::PrivateMessage(payload(event, data)?),
            "join_call" => Self::JoinCall(payload(event, data)?),
            "webrtc_signal" => Self::WebrtcSignal(payload(event, data)?),
            "leave_call" => Self::LeaveCall(payload(event, data)?),
            other => return Err(DomainError::malformed(format!("unknown event `{other}`"))),
        })
    }

    /// 事件名称，用于日志
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Json(_) => "json",
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::PrivateMessage(_) => "private_message",
            Self::JoinCall(_) => "join_call",
            Self::WebrtcSignal(_) => "webrtc_signal",
            Self::LeaveCall(_) => "leave_call",
        }
    }
}

/// 服务端发往客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// 纯文本聊天广播
    Message(String),
    /// 结构化聊天或系统通知
    MessageResponse { message: String, username: String },
    /// 私信投递
    NewPrivateMessage {
        message: String,
        sender: String,
        recipient: String,
        timestamp: String,
    },
    /// 通话双方均已就绪，peer1 为先加入的一方
    PeersConnected {
        peer1: ConnectionId,
        peer2: ConnectionId,
    },
    /// 转发的信令负载，原样写出
    WebrtcSignal(Signal),
    /// 通话另一方离开
    PeerLeft { peer: String },
    /// 仅发给请求方的错误结果
    Error { code: String, message: String },
}

impl ServerEvent {
    /// 用户加入聊天的系统通知
    pub fn joined_chat(username: &str) -> Self {
        Self::MessageResponse {
            message: format!("{username} has joined the chat."),
            username: SYSTEM_USERNAME.to_string(),
        }
    }

    /// 用户离开聊天的系统通知
    pub fn left_chat(username: &str) -> Self {
        Self::MessageResponse {
            message: format!("{username} has left the chat."),
            username: SYSTEM_USERNAME.to_string(),
        }
    }

    pub fn new_private_message(message: &PrivateMessage) -> Self {
        Self::NewPrivateMessage {
            message: message.body.clone(),
            sender: message.sender.username.clone(),
            recipient: message.recipient.username.clone(),
            timestamp: message.display_timestamp(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// 事件名称，用于日志
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::MessageResponse { .. } => "message_response",
            Self::NewPrivateMessage { .. } => "new_private_message",
            Self::PeersConnected { .. } => "peers_connected",
            Self::WebrtcSignal(_) => "webrtc_signal",
            Self::PeerLeft { .. } => "peer_left",
            Self::Error { .. } => "error",
        }
    }

    /// 序列化为文本帧
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
