//! Shared protocol types for the gateway core, tools, and HTTP surface.
//!
//! This crate defines serializable conversation/result/tool structures and
//! strongly-typed error enums shared across the workspace.

pub mod error;
pub mod message;
pub mod result;
pub mod tool;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of conversation and session identity types.
pub use message::{
    ConversationTurn, DEFAULT_SESSION_ID, HistoryView, RemovedSessions, ResetFilter, ResetOutcome,
    Role, SessionKey,
};
/// Re-export of query result types.
pub use result::{QueryAllResult, QueryResult, QuerySummary, ResponsePayload, StructuredAnswer};
/// Re-export of tool call definition and result types.
pub use tool::{ToolCall, ToolDefinition, ToolResult};
