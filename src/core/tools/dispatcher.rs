use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::base::{ToolHandler, ToolRegistry};
use crate::core::realtime::{ClientEvent, FunctionCallRequest, RealtimeResult};
use crate::core::transport::DataChannel;

/// Routes model-issued function calls to registered handlers.
///
/// A call whose arguments are not valid JSON is dropped without a reply.
/// Every other call produces exactly one `function_call_output` followed by
/// `response.create`, since the service does not resume on its own after a
/// tool result.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn register(&self, handler: Arc<dyn ToolHandler>) {
        if self.registry.register(handler).is_some() {
            debug!("Replaced an existing tool handler");
        }
    }

    /// Run the call and return the serialized output, or `None` when the
    /// arguments cannot be parsed.
    pub async fn dispatch(&self, request: &FunctionCallRequest) -> Option<String> {
        let args = match parse_arguments(&request.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(
                    "Dropping call {} to {}: invalid arguments: {}",
                    request.call_id, request.name, e
                );
                return None;
            }
        };

        let Some(handler) = self.registry.get(&request.name) else {
            warn!("No handler registered for tool {}", request.name);
            return Some(json!({ "error": format!("Unknown tool: {}", request.name) }).to_string());
        };

        info!("Calling tool {} ({})", request.name, request.call_id);
        // Run on its own task so a panicking handler is contained
        let outcome = tokio::spawn(async move { handler.call(args).await }).await;
        let output = match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!("Tool {} failed: {}", request.name, e);
                json!({ "error": e.to_string() })
            }
            Err(e) => {
                warn!("Tool {} aborted: {}", request.name, e);
                json!({ "error": format!("Tool {} failed unexpectedly", request.name) })
            }
        };
        Some(output.to_string())
    }

    /// Dispatch and deliver the result over the control channel.
    pub async fn handle(
        &self,
        request: &FunctionCallRequest,
        channel: &dyn DataChannel,
    ) -> RealtimeResult<()> {
        let Some(output) = self.dispatch(request).await else {
            return Ok(());
        };
        let result = ClientEvent::function_call_output(&request.call_id, output);
        channel.send_text(result.to_json()?).await?;
        channel
            .send_text(ClientEvent::create_response(None).to_json()?)
            .await?;
        debug!("Delivered result for call {}", request.call_id);
        Ok(())
    }
}

fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}
