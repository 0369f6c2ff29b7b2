//! Tool trait and dispatch.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use todoclaw_client::{ServiceError, TodoClient};
use todoclaw_core::tool::{ToolFailure, ToolName};

/// One of the six todo tools.
///
/// `execute` receives arguments already validated and normalized against
/// the tool's spec.
#[async_trait]
pub trait TodoTool: Send + Sync {
    fn name(&self) -> ToolName;

    async fn execute(&self, client: &TodoClient, args: &Map<String, Value>) -> Result<Value, ToolFailure>;
}

/// Name-indexed set of tools.
pub struct ToolRegistry {
    tools: HashMap<ToolName, Box<dyn TodoTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn TodoTool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: ToolName) -> Option<&dyn TodoTool> {
        self.tools.get(&name).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve, validate and run one call.
    pub async fn dispatch(
        &self,
        client: &TodoClient,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolFailure> {
        let tool_name = ToolName::parse(name).ok_or_else(|| ToolFailure::unknown_tool(name))?;
        let tool = self.get(tool_name).ok_or_else(|| ToolFailure::unknown_tool(name))?;
        let args = tool_name.spec().validate(arguments)?;
        tool.execute(client, &args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a todo service error onto the tool-level taxonomy.
pub fn service_failure(err: ServiceError) -> ToolFailure {
    match err {
        ServiceError::NotFound(detail) => ToolFailure::not_found(detail),
        ServiceError::Unauthorized(detail) => ToolFailure::unauthorized(format!(
            "The todo service rejected the credential: {detail}"
        )),
        ServiceError::Upstream { status, body } => ToolFailure::upstream(Some(status), body),
        other => ToolFailure::upstream(None, other.to_string()),
    }
}

/// Read the (validated) `todo_id` argument.
pub(crate) fn todo_id(args: &Map<String, Value>) -> Result<i64, ToolFailure> {
    args.get("todo_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| ToolFailure::invalid_argument("todo_id", "'todo_id' must be an integer"))
}

/// Read an optional string argument.
pub(crate) fn opt_str(args: &Map<String, Value>, field: &str) -> Option<String> {
    args.get(field).and_then(Value::as_str).map(str::to_string)
}
