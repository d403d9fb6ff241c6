//! Tool handler trait, errors and the concurrent handler registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

use crate::core::realtime::{RealtimeError, ToolDef};

/// Errors raised by tool handlers.
///
/// These never reach the caller: the dispatcher turns them into an
/// `{"error": ...}` payload so generation can continue.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool request failed: {0}")]
    Request(String),

    #[error("Tool endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Tool response could not be decoded: {0}")]
    Decode(String),

    #[error("{0}")]
    Failed(String),
}

impl From<ToolError> for RealtimeError {
    fn from(err: ToolError) -> Self {
        RealtimeError::ToolHandler(err.to_string())
    }
}

/// Result type for tool calls.
pub type ToolResult<T> = Result<T, ToolError>;

/// A function the model may call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Definition advertised to the model in `session.update`.
    fn definition(&self) -> ToolDef;

    /// Run the tool with parsed JSON arguments.
    async fn call(&self, args: Value) -> ToolResult<Value>;

    fn name(&self) -> String {
        self.definition().name
    }
}

/// Async closure backing a [`FnTool`].
pub type ToolFn =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = ToolResult<Value>> + Send>> + Send + Sync>;

/// Tool implemented by a closure.
#[derive(Clone)]
pub struct FnTool {
    definition: ToolDef,
    func: ToolFn,
}

impl FnTool {
    pub fn new<F, Fut>(definition: ToolDef, func: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult<Value>> + Send + 'static,
    {
        Self {
            definition,
            func: Arc::new(move |args| Box::pin(func(args))),
        }
    }
}

#[async_trait]
impl ToolHandler for FnTool {
    fn definition(&self) -> ToolDef {
        self.definition.clone()
    }

    async fn call(&self, args: Value) -> ToolResult<Value> {
        (self.func)(args).await
    }
}

/// Registered tool handlers keyed by function name.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: DashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaced.
    pub fn register(&self, handler: Arc<dyn ToolHandler>) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.insert(handler.name(), handler)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.remove(name).map(|(_, handler)| handler)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Definitions of every handler, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self.handlers.iter().map(|e| e.value().definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
