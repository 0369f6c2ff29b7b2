//! # TodoClaw Core
//!
//! Domain types, traits, and error definitions shared by every TodoClaw crate.
//! This crate performs **no I/O**; it defines the vocabulary the tool
//! process, the tool channel, the reasoning loop and the chat endpoint speak.
//!
//! ## Layout
//!
//! - [`tool`]: the fixed six-tool table, argument validation, call/result types
//! - [`protocol`]: newline-delimited frames exchanged with the tool process
//! - [`channel`]: the `ToolChannel` / `ChannelOpener` seams used by orchestration
//! - [`credential`]: the per-request bearer credential
//! - [`message`] / [`provider`]: conversation turns and the LLM abstraction

pub mod error;
pub mod message;
pub mod provider;
pub mod channel;
pub mod tool;
pub mod protocol;
pub mod credential;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{ChannelError, ProviderError};
pub use message::{Conversation, HistoryTurn, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use channel::{ChannelOpener, ToolChannel};
pub use tool::{
    FailureKind, ParamSpec, ParamType, ToolCallRequest, ToolCallResult, ToolFailure, ToolName,
    ToolOutcome, ToolSpec, tool_definitions, tool_specs,
};
pub use protocol::{Frame, PROTOCOL_VERSION};
pub use credential::Credential;
pub use event::{DomainEvent, EventBus};
