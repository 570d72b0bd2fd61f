use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::CodecOption;

/// Command received on the message channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum InboundMessage {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "stop")]
    Stop,
    /// Query whether a session is active
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "getAvailableCodecs")]
    GetAvailableCodecs,
    #[serde(rename = "updateFields")]
    UpdateFields {
        #[serde(default)]
        content: Map<String, Value>,
    },
}

/// Response or push sent back on the message channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "content")]
pub enum OutboundMessage {
    #[serde(rename = "running")]
    Running(bool),
    #[serde(rename = "getAvailableCodecs")]
    AvailableCodecs(Vec<CodecOption>),
}
