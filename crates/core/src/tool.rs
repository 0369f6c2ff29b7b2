//! The fixed tool surface.
//!
//! Six tools, defined once in [`tool_specs`], shared read-only by the
//! reasoning loop (which renders them as function schemas for the model) and
//! by the tool process (which validates incoming calls against them).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::provider::ToolDefinition;

/// The closed set of tool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    CreateTodo,
    ListTodos,
    GetTodo,
    UpdateTodo,
    DeleteTodo,
    ToggleTodoComplete,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::CreateTodo,
        ToolName::ListTodos,
        ToolName::GetTodo,
        ToolName::UpdateTodo,
        ToolName::DeleteTodo,
        ToolName::ToggleTodoComplete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::CreateTodo => "create_todo",
            ToolName::ListTodos => "list_todos",
            ToolName::GetTodo => "get_todo",
            ToolName::UpdateTodo => "update_todo",
            ToolName::DeleteTodo => "delete_todo",
            ToolName::ToggleTodoComplete => "toggle_todo_complete",
        }
    }

    /// Resolve a name as emitted by the model or received over the wire.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn spec(&self) -> &'static ToolSpec {
        // The table is ordered like `ALL`.
        &TOOL_SPECS[*self as usize]
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar parameter types accepted by the tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl ParamType {
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
    pub description: &'static str,
    /// Closed set of accepted values; empty means unrestricted.
    pub allowed: &'static [&'static str],
    /// Value applied when the parameter is omitted.
    pub default: Option<&'static str>,
}

impl ParamSpec {
    const fn new(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            description,
            allowed: &[],
            default: None,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn one_of(mut self, allowed: &'static [&'static str], default: &'static str) -> Self {
        self.allowed = allowed;
        self.default = Some(default);
        self
    }

    fn schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.ty.json_type()));
        prop.insert("description".into(), json!(self.description));
        if !self.allowed.is_empty() {
            prop.insert("enum".into(), json!(self.allowed));
        }
        if let Some(default) = self.default {
            prop.insert("default".into(), json!(default));
        }
        Value::Object(prop)
    }
}

/// An immutable tool definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: ToolName,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    /// At least one of these parameters must be present (empty = no constraint).
    pub at_least_one_of: &'static [&'static str],
}

const TODO_ID: ParamSpec = ParamSpec::new("todo_id", ParamType::Integer, "The ID of the todo").required();

static TOOL_SPECS: [ToolSpec; 6] = [
    ToolSpec {
        name: ToolName::CreateTodo,
        description: "Create a new todo item for the current user.",
        params: &[
            ParamSpec::new("name", ParamType::String, "The name/title of the todo item").required(),
            ParamSpec::new("description", ParamType::String, "Optional description"),
            ParamSpec::new(
                "due_date",
                ParamType::String,
                "Optional due date in ISO-8601 format (YYYY-MM-DDTHH:MM:SS)",
            ),
        ],
        at_least_one_of: &[],
    },
    ToolSpec {
        name: ToolName::ListTodos,
        description: "List the current user's todos. Supports search and sorting.",
        params: &[
            ParamSpec::new("search", ParamType::String, "Case-insensitive search over name and description"),
            ParamSpec::new("sort_by", ParamType::String, "Sort field")
                .one_of(&["name", "creation_date", "due_date"], "creation_date"),
            ParamSpec::new("sort_order", ParamType::String, "Sort order").one_of(&["asc", "desc"], "desc"),
        ],
        at_least_one_of: &[],
    },
    ToolSpec {
        name: ToolName::GetTodo,
        description: "Get a specific todo by ID.",
        params: &[TODO_ID],
        at_least_one_of: &[],
    },
    ToolSpec {
        name: ToolName::UpdateTodo,
        description: "Update an existing todo item. Use is_completed=true to mark it completed, \
                      is_completed=false to mark it not completed.",
        params: &[
            TODO_ID,
            ParamSpec::new("name", ParamType::String, "Updated name"),
            ParamSpec::new("description", ParamType::String, "Updated description"),
            ParamSpec::new(
                "due_date",
                ParamType::String,
                "Updated due date in ISO-8601 format (YYYY-MM-DDTHH:MM:SS)",
            ),
            ParamSpec::new("is_completed", ParamType::Boolean, "Set completion status"),
        ],
        at_least_one_of: &["name", "description", "due_date", "is_completed"],
    },
    ToolSpec {
        name: ToolName::DeleteTodo,
        description: "Delete a todo item.",
        params: &[ParamSpec::new("todo_id", ParamType::Integer, "The ID of the todo to delete").required()],
        at_least_one_of: &[],
    },
    ToolSpec {
        name: ToolName::ToggleTodoComplete,
        description: "Toggle the completion status of a todo (completed becomes not completed and vice versa).",
        params: &[ParamSpec::new("todo_id", ParamType::Integer, "The ID of the todo to toggle").required()],
        at_least_one_of: &[],
    },
];

/// The full tool table, in a stable order.
pub fn tool_specs() -> &'static [ToolSpec] {
    &TOOL_SPECS
}

/// Function definitions for all six tools, as presented to the model and
/// advertised in the capabilities frame.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    TOOL_SPECS.iter().map(ToolSpec::to_definition).collect()
}

impl ToolSpec {
    /// JSON Schema of this tool's arguments.
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.schema()))
            .collect();
        let required: Vec<&str> = self.params.iter().filter(|p| p.required).map(|p| p.name).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.as_str().to_string(),
            description: self.description.to_string(),
            parameters: self.parameters_schema(),
        }
    }

    /// Check `arguments` against this spec.
    ///
    /// Returns the normalized argument map: `null` optional values dropped and
    /// defaults applied. Errors name the offending field.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<Map<String, Value>, ToolFailure> {
        if let Some(unknown) = arguments.keys().find(|k| !self.params.iter().any(|p| p.name == k.as_str())) {
            return Err(ToolFailure::invalid_argument(
                unknown,
                format!("'{unknown}' is not a parameter of {}", self.name),
            ));
        }

        let mut normalized = Map::new();
        for param in self.params {
            let value = match arguments.get(param.name) {
                Some(Value::Null) | None => {
                    if param.required {
                        return Err(ToolFailure::invalid_argument(
                            param.name,
                            format!("missing required argument '{}'", param.name),
                        ));
                    }
                    if let Some(default) = param.default {
                        normalized.insert(param.name.into(), json!(default));
                    }
                    continue;
                }
                Some(v) => v,
            };

            if !param.ty.accepts(value) {
                return Err(ToolFailure::invalid_argument(
                    param.name,
                    format!("'{}' must be of type {}", param.name, param.ty.json_type()),
                ));
            }
            if let Some(s) = value.as_str() {
                if param.required && s.trim().is_empty() {
                    return Err(ToolFailure::invalid_argument(
                        param.name,
                        format!("'{}' must not be empty", param.name),
                    ));
                }
                if !param.allowed.is_empty() && !param.allowed.contains(&s) {
                    return Err(ToolFailure::invalid_argument(
                        param.name,
                        format!("'{}' must be one of: {}", param.name, param.allowed.join(", ")),
                    ));
                }
            }
            normalized.insert(param.name.into(), value.clone());
        }

        if !self.at_least_one_of.is_empty() && !self.at_least_one_of.iter().any(|f| normalized.contains_key(*f)) {
            return Err(ToolFailure {
                kind: FailureKind::InvalidArguments,
                message: format!(
                    "{} requires at least one of: {}",
                    self.name,
                    self.at_least_one_of.join(", ")
                ),
                field: None,
                status: None,
            });
        }

        Ok(normalized)
    }
}

/// Tool-level failure kinds. These are observations, not run failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    UnknownTool,
    InvalidArguments,
    NotFound,
    Unauthorized,
    UpstreamFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::UnknownTool => "UnknownTool",
            FailureKind::InvalidArguments => "InvalidArguments",
            FailureKind::NotFound => "NotFound",
            FailureKind::Unauthorized => "Unauthorized",
            FailureKind::UpstreamFailure => "UpstreamFailure",
        };
        f.write_str(s)
    }
}

/// A failure descriptor carried in `error` frames.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
    /// The argument at fault, for `InvalidArguments`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Upstream HTTP status, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ToolFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
            status: None,
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        let known: Vec<&str> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
        Self::new(
            FailureKind::UnknownTool,
            format!("unknown tool '{name}'; available tools: {}", known.join(", ")),
        )
    }

    pub fn invalid_argument(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            ..Self::new(FailureKind::InvalidArguments, message)
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: Some(404),
            ..Self::new(FailureKind::NotFound, message)
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unauthorized, message)
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            ..Self::new(FailureKind::UpstreamFailure, message)
        }
    }
}

/// A tool invocation, created by the reasoning loop and consumed once by the
/// tool channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id; echoed back on the matching result.
    pub id: String,
    /// Tool name as requested. May name a tool that does not exist.
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    /// Build a request, keeping the model's call id when it supplied one.
    pub fn new(id: Option<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        let id = id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
        Self {
            id,
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(Value),
    Failure(ToolFailure),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ToolOutcome::Success(_) => None,
            ToolOutcome::Failure(f) => Some(f.kind),
        }
    }

    /// Render as observation text for the model.
    pub fn to_observation(&self) -> String {
        match self {
            ToolOutcome::Success(payload) => payload.to_string(),
            ToolOutcome::Failure(failure) => json!({ "error": failure }).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub outcome: ToolOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn table_is_ordered_like_names() {
        for name in ToolName::ALL {
            assert_eq!(name.spec().name, name);
        }
        assert_eq!(tool_specs().len(), 6);
    }

    #[test]
    fn names_parse_and_display() {
        assert_eq!(ToolName::parse("toggle_todo_complete"), Some(ToolName::ToggleTodoComplete));
        assert_eq!(ToolName::parse("drop_database"), None);
        assert_eq!(ToolName::UpdateTodo.to_string(), "update_todo");
        let json = serde_json::to_string(&ToolName::ListTodos).unwrap();
        assert_eq!(json, "\"list_todos\"");
    }

    #[test]
    fn schema_lists_required_and_enums() {
        let schema = ToolName::ListTodos.spec().parameters_schema();
        assert_eq!(schema["required"], json!([]));
        assert_eq!(schema["properties"]["sort_by"]["enum"], json!(["name", "creation_date", "due_date"]));
        assert_eq!(schema["properties"]["sort_order"]["default"], "desc");

        let schema = ToolName::CreateTodo.spec().parameters_schema();
        assert_eq!(schema["required"], json!(["name"]));
    }

    #[test]
    fn list_defaults_are_applied() {
        let out = ToolName::ListTodos.spec().validate(&Map::new()).unwrap();
        assert_eq!(out["sort_by"], "creation_date");
        assert_eq!(out["sort_order"], "desc");
        assert!(!out.contains_key("search"));
    }

    #[test]
    fn missing_required_names_the_field() {
        let err = ToolName::GetTodo.spec().validate(&Map::new()).unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidArguments);
        assert_eq!(err.field.as_deref(), Some("todo_id"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = ToolName::DeleteTodo
            .spec()
            .validate(&args(json!({"todo_id": "12"})))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("todo_id"));
        assert!(err.message.contains("integer"));
    }

    #[test]
    fn enum_value_outside_set_is_rejected() {
        let err = ToolName::ListTodos
            .spec()
            .validate(&args(json!({"sort_by": "priority"})))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("sort_by"));
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let err = ToolName::GetTodo
            .spec()
            .validate(&args(json!({"todo_id": 1, "verbose": true})))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("verbose"));
    }

    #[test]
    fn null_optional_is_treated_as_absent() {
        let out = ToolName::CreateTodo
            .spec()
            .validate(&args(json!({"name": "Buy milk", "description": null})))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out["name"], "Buy milk");
    }

    #[test]
    fn update_requires_some_field() {
        let err = ToolName::UpdateTodo
            .spec()
            .validate(&args(json!({"todo_id": 3})))
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidArguments);
        assert!(err.message.contains("at least one of"));

        let ok = ToolName::UpdateTodo
            .spec()
            .validate(&args(json!({"todo_id": 3, "is_completed": false})))
            .unwrap();
        assert_eq!(ok["is_completed"], false);
    }

    #[test]
    fn blank_required_string_is_rejected() {
        let err = ToolName::CreateTodo
            .spec()
            .validate(&args(json!({"name": "   "})))
            .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("name"));
    }

    #[test]
    fn request_keeps_model_id_or_generates_one() {
        let kept = ToolCallRequest::new(Some("call_abc".into()), "get_todo", Map::new());
        assert_eq!(kept.id, "call_abc");
        let generated = ToolCallRequest::new(Some(String::new()), "get_todo", Map::new());
        assert!(generated.id.starts_with("call_"));
        assert_ne!(generated.id, "call_");
    }

    #[test]
    fn failure_observation_is_json() {
        let outcome = ToolOutcome::Failure(ToolFailure::not_found("Todo not found"));
        let v: Value = serde_json::from_str(&outcome.to_observation()).unwrap();
        assert_eq!(v["error"]["kind"], "NotFound");
        assert_eq!(v["error"]["status"], 404);
        assert_eq!(outcome.failure_kind(), Some(FailureKind::NotFound));
    }
}
