//! Function-call tools the model may invoke during a call.

mod base;
mod dispatcher;
mod http;

pub use base::{FnTool, ToolError, ToolFn, ToolHandler, ToolRegistry, ToolResult};
pub use dispatcher::ToolDispatcher;
pub use http::{DEFAULT_TOOL_TIMEOUT_SECS, HttpGetTool, HttpToolConfig, query_pairs};
