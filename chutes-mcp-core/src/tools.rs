//! # MCP Tools Management
//!
//! Registry and dispatcher for MCP tools, plus helpers that derive a tool's
//! input schema from a Rust type and adapt typed async functions into tool
//! handlers.

use crate::context::ToolContext;
use crate::types::{CallToolRequest, CallToolResponse, Tool, ToolResponseContent};
use anyhow::Result;
use futures::future::BoxFuture;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// Registry and dispatcher for MCP tools.
pub struct Tools {
    tool_handlers: HashMap<String, ToolHandler>,
}

impl Tools {
    pub(crate) fn new(map: HashMap<String, ToolHandler>) -> Self {
        Self { tool_handlers: map }
    }

    /// Invokes a tool. Fails only if no tool with that name is registered;
    /// failures inside the tool come back as an `is_error` response.
    pub async fn call_tool(&self, req: CallToolRequest, ctx: ToolContext) -> Result<CallToolResponse> {
        let handler = self
            .tool_handlers
            .get(&req.name)
            .ok_or_else(|| anyhow::anyhow!("Tool not found: {}", req.name))?;

        let ctx = ctx.with_progress_token(req.progress_token());
        Ok((handler.f)(req, ctx).await)
    }

    /// Lists all registered tools, ordered by name.
    pub fn list_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self
            .tool_handlers
            .values()
            .map(|tool_handler| tool_handler.tool.clone())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}

/// A tool handler: takes the call and its context, resolves to the result.
pub type ToolHandlerFn =
    Arc<dyn Fn(CallToolRequest, ToolContext) -> BoxFuture<'static, CallToolResponse> + Send + Sync>;

pub(crate) struct ToolHandler {
    pub tool: Tool,
    pub f: ToolHandlerFn,
}

/// JSON schema of `P`, suitable for `Tool::input_schema`.
///
/// Subschemas are inlined so the result is a single self-contained object.
pub fn tool_schema<P: JsonSchema>() -> serde_json::Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<P>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(object) = value.as_object_mut() {
        object.remove("title");
        object.remove("definitions");
    }
    value
}

/// Adapts a typed async function into a `ToolHandlerFn`.
///
/// Missing arguments decode from `{}`; arguments that fail to decode yield an
/// `is_error` response naming the problem. `Err` from the function is
/// reported the same way with its `Display` text.
pub fn typed_handler<P, F, Fut, E>(f: F) -> ToolHandlerFn
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Vec<ToolResponseContent>, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |req: CallToolRequest, ctx: ToolContext| -> BoxFuture<'static, CallToolResponse> {
        let f = f.clone();
        Box::pin(async move {
            let arguments = serde_json::Value::Object(req.arguments.unwrap_or_default());
            let params: P = match serde_json::from_value(arguments) {
                Ok(params) => params,
                Err(e) => {
                    tracing::warn!("Invalid parameters for tool {}: {}", req.name, e);
                    return crate::tool_error_response!(format!("Invalid parameters: {}", e));
                }
            };
            match f(params, ctx).await {
                Ok(content) => CallToolResponse {
                    content,
                    is_error: None,
                    meta: None,
                },
                Err(e) => crate::tool_error_response!(e),
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    /// Parameters of a test tool.
    #[derive(Deserialize, JsonSchema)]
    struct CountParams {
        /// How many to count
        #[schemars(range(min = 1, max = 10))]
        #[serde(default = "default_count")]
        count: u32,
        label: Option<String>,
    }

    fn default_count() -> u32 {
        3
    }

    fn counting_tools() -> Tools {
        let handler = typed_handler(|params: CountParams, _ctx: ToolContext| async move {
            if params.count > 10 {
                return Err(format!("count {} is too large", params.count));
            }
            let label = params.label.unwrap_or_else(|| "n".to_string());
            Ok(vec![crate::tool_text_content!(format!(
                "{}={}",
                label, params.count
            ))])
        });
        let mut map = HashMap::new();
        for name in ["count", "another"] {
            map.insert(
                name.to_string(),
                ToolHandler {
                    tool: Tool {
                        name: name.to_string(),
                        description: None,
                        input_schema: tool_schema::<CountParams>(),
                        annotations: None,
                    },
                    f: handler.clone(),
                },
            );
        }
        Tools::new(map)
    }

    fn call(arguments: Option<serde_json::Value>) -> CallToolRequest {
        CallToolRequest {
            name: "count".to_string(),
            arguments: arguments.and_then(|a| a.as_object().cloned()),
            meta: None,
        }
    }

    fn text_of(response: &CallToolResponse) -> &str {
        match &response.content[0] {
            ToolResponseContent::Text(t) => &t.text,
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_schema_is_self_contained() {
        let schema = tool_schema::<CountParams>();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["count"]["minimum"], 1.0);
        assert_eq!(schema["properties"]["count"]["maximum"], 10.0);
        assert_eq!(schema["properties"]["count"]["default"], 3);
        assert!(schema.get("title").is_none());
        assert!(schema.get("$schema").is_none());
    }

    #[tokio::test]
    async fn test_missing_arguments_use_defaults() {
        let tools = counting_tools();
        let response = tools.call_tool(call(None), ToolContext::detached()).await.unwrap();
        assert_eq!(response.is_error, None);
        assert_eq!(text_of(&response), "n=3");
    }

    #[tokio::test]
    async fn test_errors_are_reported_in_band() {
        let tools = counting_tools();
        let response = tools
            .call_tool(call(Some(json!({ "count": "many" }))), ToolContext::detached())
            .await
            .unwrap();
        assert_eq!(response.is_error, Some(true));
        assert!(text_of(&response).starts_with("Invalid parameters:"));

        let response = tools
            .call_tool(call(Some(json!({ "count": 12 }))), ToolContext::detached())
            .await
            .unwrap();
        assert_eq!(response.is_error, Some(true));
        assert_eq!(text_of(&response), "count 12 is too large");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_listing_order() {
        let tools = counting_tools();
        let mut req = call(None);
        req.name = "missing".to_string();
        assert!(tools.call_tool(req, ToolContext::detached()).await.is_err());

        let names: Vec<String> = tools.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["another", "count"]);
    }
}
