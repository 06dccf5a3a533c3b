use futures::FutureExt;
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::protocol::models::Tool;
use crate::realtime::BoxFuture;
use crate::{Error, Result};

const EXECUTION_FAILED: &str = "Tool execution failed";

/// Call context attached by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolContext {
    pub call_sid: Option<String>,
    pub caller_phone: Option<String>,
}

impl ToolContext {
    #[must_use]
    pub fn for_call(call_sid: impl Into<String>) -> Self {
        Self {
            call_sid: Some(call_sid.into()),
            caller_phone: None,
        }
    }

    #[must_use]
    pub fn caller_phone(mut self, phone: impl Into<String>) -> Self {
        self.caller_phone = Some(phone.into());
        self
    }
}

enum Failure {
    Decode(String),
    Tool(Error),
}

type ToolHandler =
    Box<dyn Fn(Value, ToolContext) -> BoxFuture<'static, std::result::Result<Value, Failure>> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub schema: RootSchema,
}

/// Name → typed handler table. Dispatch always yields a JSON value.
#[derive(Default)]
pub struct ToolCallRouter {
    defs: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl std::fmt::Debug for ToolCallRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallRouter")
            .field("tools", &self.defs.iter().map(|d| d.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

fn schema_for<T: JsonSchema>() -> RootSchema {
    SchemaSettings::draft07()
        .with(|settings| {
            settings.inline_subschemas = true;
            settings.option_add_null_type = false;
            settings.meta_schema = None;
        })
        .into_generator()
        .into_root_schema_for::<T>()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_default()
}

fn error_value(message: String) -> Value {
    if message.is_empty() {
        json!({ "error": EXECUTION_FAILED })
    } else {
        json!({ "error": message })
    }
}

impl ToolCallRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.defs
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Register `handler` under `name`. A later registration with the same name replaces it.
    pub fn tool_with_description<TArgs, TResp, F, Fut>(
        &mut self,
        name: &str,
        description: impl Into<String>,
        handler: F,
    ) where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        let name = name.to_string();
        let entry = ToolDefinition {
            name: name.clone(),
            description: Some(description.into()),
            schema: schema_for::<TArgs>(),
        };
        self.defs.retain(|def| def.name != name);
        self.defs.push(entry);

        let user_handler = Arc::new(handler);
        let handler = move |value: Value, ctx: ToolContext| -> BoxFuture<'static, _> {
            let user_handler = Arc::clone(&user_handler);
            Box::pin(async move {
                let args: TArgs =
                    serde_json::from_value(value).map_err(|e| Failure::Decode(e.to_string()))?;
                let resp = user_handler(args, ctx).await.map_err(Failure::Tool)?;
                serde_json::to_value(resp).map_err(|e| Failure::Tool(e.into()))
            })
        };

        self.handlers.insert(name, Box::new(handler));
    }

    /// Protocol tool definitions, in registration order.
    ///
    /// # Errors
    /// Returns an error if schema serialization fails.
    #[allow(clippy::result_large_err)]
    pub fn try_as_tools(&self) -> Result<Vec<Tool>> {
        self.defs
            .iter()
            .map(|def| {
                let mut parameters = serde_json::to_value(&def.schema)?;
                if let Some(object) = parameters.as_object_mut() {
                    object.remove("title");
                    object
                        .entry("properties")
                        .or_insert_with(|| Value::Object(serde_json::Map::new()));
                }
                Ok(Tool::Function {
                    name: def.name.clone(),
                    description: def.description.clone(),
                    parameters,
                })
            })
            .collect()
    }

    pub async fn dispatch(&self, name: &str, args: Value) -> Value {
        self.dispatch_with(name, args, &ToolContext::default()).await
    }

    /// Run the named tool. Never fails: every outcome is a JSON value.
    pub async fn dispatch_with(&self, name: &str, args: Value, ctx: &ToolContext) -> Value {
        let Some(handler) = self.handlers.get(name) else {
            warn!(tool = %name, "Unknown tool requested");
            return json!({ "error": format!("Unknown tool: {name}") });
        };
        let args = if args.is_null() { json!({}) } else { args };
        debug!(tool = %name, "Dispatching tool call");

        match AssertUnwindSafe(handler(args, ctx.clone())).catch_unwind().await {
            Ok(Ok(value)) => value,
            Ok(Err(Failure::Decode(detail))) => {
                warn!(tool = %name, error = %detail, "Tool arguments rejected");
                json!({ "error": format!("Invalid arguments for {name}: {detail}") })
            }
            Ok(Err(Failure::Tool(err))) => {
                warn!(tool = %name, error = %err, "Tool failed");
                error_value(err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(tool = %name, panic = %message, "Tool panicked");
                error_value(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Echo {
        /// Text to echo
        text: String,
        times: Option<u32>,
    }

    fn router() -> ToolCallRouter {
        let mut router = ToolCallRouter::new();
        router.tool_with_description("echo", "Echo text", |args: Echo, ctx| async move {
            Ok(json!({
                "text": args.text.repeat(args.times.unwrap_or(1) as usize),
                "callSid": ctx.call_sid,
            }))
        });
        router.tool_with_description("fail", "Always fails", |_: Echo, _| async move {
            Err::<Value, _>(Error::Integration(String::new()))
        });
        router
    }

    #[test]
    fn schema_marks_options_optional() {
        let tools = router().try_as_tools().unwrap();
        let Tool::Function { parameters, .. } = &tools[0] else {
            panic!("expected function tool");
        };
        assert_eq!(parameters["required"], json!(["text"]));
        assert_eq!(parameters["properties"]["text"]["description"], "Text to echo");
        assert_eq!(parameters["properties"]["times"]["type"], "integer");
        assert!(parameters.get("title").is_none());
        assert!(parameters.get("$schema").is_none());
    }

    #[tokio::test]
    async fn passes_context_to_handlers() {
        let ctx = ToolContext::for_call("CA123");
        let out = router()
            .dispatch_with("echo", json!({ "text": "ab", "times": 2 }), &ctx)
            .await;
        assert_eq!(out, json!({ "text": "abab", "callSid": "CA123" }));
    }

    #[tokio::test]
    async fn empty_error_messages_get_a_default() {
        let out = router().dispatch("fail", json!({ "text": "x" })).await;
        assert_eq!(out, json!({ "error": "Tool execution failed" }));
    }

    #[tokio::test]
    async fn null_arguments_decode_as_empty_object() {
        let out = router().dispatch("echo", Value::Null).await;
        let message = out["error"].as_str().unwrap();
        assert!(message.starts_with("Invalid arguments for echo: missing field `text`"));
    }
}
