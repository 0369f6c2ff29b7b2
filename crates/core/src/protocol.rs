//! Wire frames exchanged between the tool channel and the tool process.
//!
//! One JSON object per line on stdin/stdout, tagged by `kind`:
//!
//! ```text
//! -> {"kind":"init","protocol_version":1,"client":"todoclaw/0.1.0"}
//! <- {"kind":"capabilities","protocol_version":1,"tools":[...]}
//! -> {"kind":"call","id":"call_1","tool":"get_todo","arguments":{"todo_id":4}}
//! <- {"kind":"result","id":"call_1","payload":{...}}
//! <- {"kind":"error","id":"call_1","error":{"kind":"NotFound","message":"..."}}
//! ```
//!
//! An `error` frame with a null `id` is a process-level diagnostic (startup
//! failure, undecodable input) rather than the answer to a call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::provider::ToolDefinition;
use crate::tool::{ToolCallRequest, ToolCallResult, ToolFailure, ToolOutcome};

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Init {
        protocol_version: u32,
        #[serde(default)]
        client: String,
    },
    Capabilities {
        protocol_version: u32,
        tools: Vec<ToolDefinition>,
    },
    Call {
        id: String,
        tool: String,
        #[serde(default)]
        arguments: Map<String, Value>,
    },
    Result {
        id: String,
        payload: Value,
    },
    Error {
        #[serde(default)]
        id: Option<String>,
        error: ToolFailure,
    },
}

impl Frame {
    pub fn init() -> Self {
        Frame::Init {
            protocol_version: PROTOCOL_VERSION,
            client: concat!("todoclaw/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Serialize to a single line, newline included.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one line (trailing whitespace tolerated).
    pub fn decode(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Init { .. } => "init",
            Frame::Capabilities { .. } => "capabilities",
            Frame::Call { .. } => "call",
            Frame::Result { .. } => "result",
            Frame::Error { .. } => "error",
        }
    }

    /// The correlation id, when the frame carries one.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Frame::Call { id, .. } | Frame::Result { id, .. } => Some(id.as_str()),
            Frame::Error { id, .. } => id.as_deref(),
            _ => None,
        }
    }

    /// Convert an answer frame into a call result. Returns `None` for frames
    /// that do not answer a call.
    pub fn into_call_result(self) -> Option<ToolCallResult> {
        match self {
            Frame::Result { id, payload } => Some(ToolCallResult {
                id,
                outcome: ToolOutcome::Success(payload),
            }),
            Frame::Error { id: Some(id), error } => Some(ToolCallResult {
                id,
                outcome: ToolOutcome::Failure(error),
            }),
            _ => None,
        }
    }
}

impl From<ToolCallRequest> for Frame {
    fn from(req: ToolCallRequest) -> Self {
        Frame::Call {
            id: req.id,
            tool: req.name,
            arguments: req.arguments,
        }
    }
}

impl From<ToolCallResult> for Frame {
    fn from(result: ToolCallResult) -> Self {
        match result.outcome {
            ToolOutcome::Success(payload) => Frame::Result { id: result.id, payload },
            ToolOutcome::Failure(error) => Frame::Error {
                id: Some(result.id),
                error,
            },
        }
    }
}
