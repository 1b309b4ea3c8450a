//! The tool trait.

use async_trait::async_trait;
use serde_json::Value;
use strand_sdk::ToolDefinition;

use crate::context::ToolContext;
use crate::error::ToolError;

/// The result of a tool execution.
///
/// `output` is what the model sees; `metadata` is opaque structured data
/// surfaced to observers (the output emitter) without interpretation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Human-readable result title.
    pub title: Option<String>,
    /// Text fed back to the model.
    pub output: String,
    /// Opaque structured metadata.
    pub metadata: Value,
}

impl ToolOutput {
    /// A plain text output.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            title: None,
            output: output.into(),
            metadata: Value::Null,
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A tool that can be executed by the session loop.
///
/// # Example
///
/// ```ignore
/// use strand_tools::{Tool, ToolContext, ToolOutput, ToolError};
/// use async_trait::async_trait;
///
/// struct ReadTool;
///
/// #[async_trait]
/// impl Tool for ReadTool {
///     fn name(&self) -> &str { "read" }
///     fn description(&self) -> &str { "Read file contents" }
///     fn input_schema(&self) -> serde_json::Value {
///         serde_json::json!({
///             "type": "object",
///             "properties": { "file_path": {"type": "string"} },
///             "required": ["file_path"]
///         })
///     }
///
///     async fn execute(
///         &self,
///         input: serde_json::Value,
///         ctx: &ToolContext,
///     ) -> Result<ToolOutput, ToolError> {
///         let path = input["file_path"]
///             .as_str()
///             .ok_or_else(|| ToolError::invalid_input("file_path must be a string"))?;
///         let content = tokio::fs::read_to_string(path).await?;
///         Ok(ToolOutput::text(content))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// The stable tool name.
    fn name(&self) -> &str;

    /// Human description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments.
    fn input_schema(&self) -> Value;

    /// Validate input before execution.
    ///
    /// The default implementation checks the schema's `required` list.
    fn validate(&self, input: &Value) -> Result<(), ToolError> {
        let schema = self.input_schema();
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for field in required {
                if let Some(name) = field.as_str() {
                    if input.get(name).is_none() {
                        return Err(ToolError::invalid_input(format!(
                            "missing required field: {name}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Execute the tool.
    ///
    /// Implementations must poll `ctx`'s cancellation signal and return
    /// [`ToolError::Aborted`] promptly when signaled.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;

    /// The wire definition advertised to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the message back"
        }

        fn input_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": { "message": {"type": "string"} },
                "required": ["message"]
            })
        }

        async fn execute(&self, input: Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            let message = input["message"]
                .as_str()
                .ok_or_else(|| ToolError::invalid_input("message must be a string"))?;
            Ok(ToolOutput::text(message).with_title("echoed"))
        }
    }

    #[tokio::test]
    async fn test_execute() {
        let ctx = ToolContext::new("s1", "c1");
        let output = EchoTool
            .execute(serde_json::json!({"message": "hi"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output.output, "hi");
        assert_eq!(output.title.as_deref(), Some("echoed"));
    }

    #[test]
    fn test_default_validation_checks_required() {
        assert!(EchoTool.validate(&serde_json::json!({"message": "x"})).is_ok());
        let err = EchoTool.validate(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[test]
    fn test_to_definition() {
        let def = EchoTool.to_definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.input_schema["required"][0], "message");
    }
}
