use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line-delimited JSON message on the wire surface.
#[derive(Debug, Serialize, Deserialize)]
pub struct SurfaceMessage {
    pub seq: u64,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(flatten)]
    pub content: SurfaceContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SurfaceContent {
    Request {
        command: String,
        arguments: Option<Value>,
    },
    Reply {
        request_seq: u64,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
        body: Option<Value>,
    },
}
