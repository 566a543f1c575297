use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::DataJson;
use crate::tool::ToolJson;

/// One message on the kernel <-> client comm: `{"func": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommFrame {
    pub func: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl CommFrame {
    pub fn new(func: impl Into<String>, payload: Value) -> Self {
        Self {
            func: func.into(),
            payload,
        }
    }
}

/// Kernel → client. Sent as a `CommFrame` via `into_frame`.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelMessage {
    Update(UpdatePayload),
    Notification(NotificationPayload),
}

impl KernelMessage {
    pub fn func(&self) -> &'static str {
        match self {
            Self::Update(_) => "update",
            Self::Notification(_) => "notification",
        }
    }

    pub fn into_frame(self) -> serde_json::Result<CommFrame> {
        let func = self.func();
        let payload = match self {
            Self::Update(p) => serde_json::to_value(p)?,
            Self::Notification(p) => serde_json::to_value(p)?,
        };
        Ok(CommFrame::new(func, payload))
    }
}

/// Client → kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    RequestUpdate,
}

impl ClientMessage {
    /// `None` for message kinds the kernel does not understand.
    pub fn from_frame(frame: &CommFrame) -> Option<Self> {
        match frame.func.as_str() {
            "request_update" => Some(Self::RequestUpdate),
            _ => None,
        }
    }

    pub fn to_frame(self) -> CommFrame {
        match self {
            Self::RequestUpdate => CommFrame::new("request_update", Value::Null),
        }
    }
}

/// Full registry snapshot pushed to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    #[serde(rename = "import")]
    pub imported: bool,
    pub tools: Vec<ToolJson>,
    pub data: Vec<DataJson>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub message: String,
    #[serde(default)]
    pub sender: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_frame_shape() {
        let frame = KernelMessage::Update(UpdatePayload {
            imported: true,
            tools: vec![],
            data: vec![],
        })
        .into_frame()
        .unwrap();
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            wire,
            json!({"func": "update", "payload": {"import": true, "tools": [], "data": []}})
        );
    }

    #[test]
    fn notification_frame_shape() {
        let frame = KernelMessage::Notification(NotificationPayload {
            message: "Job 12 finished".into(),
            sender: Some("GenePattern".into()),
        })
        .into_frame()
        .unwrap();
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({
                "func": "notification",
                "payload": {"message": "Job 12 finished", "sender": "GenePattern"}
            })
        );
    }

    #[test]
    fn request_update_has_no_payload() {
        let frame: CommFrame = serde_json::from_str(r#"{"func": "request_update"}"#).unwrap();
        assert_eq!(ClientMessage::from_frame(&frame), Some(ClientMessage::RequestUpdate));
        assert_eq!(
            serde_json::to_string(&ClientMessage::RequestUpdate.to_frame()).unwrap(),
            r#"{"func":"request_update"}"#
        );
    }

    #[test]
    fn unknown_func_is_not_a_client_message() {
        let frame = CommFrame::new("launch_missiles", Value::Null);
        assert_eq!(ClientMessage::from_frame(&frame), None);
    }
}
