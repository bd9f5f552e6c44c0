//! Tool registry: named external operations the language model may request
//!
//! Handlers are registered once at startup with their Gemini-style
//! declarations. Invocation never raises past this boundary: unknown names
//! and handler faults both come back as `{"error": ...}` values so the model
//! can still answer from its own judgment when live data is unavailable.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::Result;

/// Async handler taking the call arguments as a JSON object
pub type ToolHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Declaration of one callable tool, in the shape the model API expects
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDeclaration {
    /// Tool name the model calls it by
    pub name: String,
    /// What the tool does and when to use it
    pub description: String,
    /// JSON schema of the named parameters
    pub parameters: Value,
}

/// Name-to-handler mapping for model-requested tool calls
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, ToolHandler>,
    declarations: Vec<ToolDeclaration>,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its declared name
    ///
    /// Re-registering a name replaces the previous handler.
    pub fn register(&mut self, declaration: ToolDeclaration, handler: ToolHandler) {
        if self
            .handlers
            .insert(declaration.name.clone(), handler)
            .is_some()
        {
            self.declarations.retain(|d| d.name != declaration.name);
        }
        tracing::debug!(tool = %declaration.name, "tool registered");
        self.declarations.push(declaration);
    }

    /// Declarations to announce to the model at session start
    #[must_use]
    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    /// Whether a tool name is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Invoke a tool by name
    ///
    /// Always returns a result value; failures are error-shaped data, and the
    /// registry performs no retries.
    pub async fn invoke(&self, name: &str, args: Value) -> Value {
        let Some(handler) = self.handlers.get(name) else {
            tracing::warn!(tool = %name, "unknown tool requested");
            return json!({ "error": format!("알 수 없는 함수: {name}") });
        };

        tracing::info!(tool = %name, args = %args, "invoking tool");
        match handler(args).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(tool = %name, error = %e, "tool execution failed");
                json!({ "error": e.to_string() })
            }
        }
    }
}
