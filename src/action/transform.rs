// Taskweave — Local data transforms (no external service)

use super::{json_param, optional_str, required_str, ActionError, ActionHandler, Params};
use async_trait::async_trait;
use serde_json::Value;

/// Reshapes data between steps. Operates on already-interpolated params,
/// so earlier outputs reach it through `{{<step>_output}}`.
pub struct TransformHandler;

fn extract(params: &Params) -> Result<Value, ActionError> {
    let key = required_str(params, "key")?;
    // Interpolation stringifies objects, so JSON text is accepted as well.
    let source = json_param(params, "source")?;

    let found = if key.starts_with('/') {
        source.pointer(key)
    } else {
        source.get(key)
    };
    Ok(found.cloned().unwrap_or(Value::Null))
}

fn join(params: &Params) -> Result<Value, ActionError> {
    let separator = optional_str(params, "separator")?.unwrap_or("\n");
    let items = json_param(params, "items")?;
    let items = items.as_array().ok_or_else(|| ActionError::InvalidParam {
        name: "items".into(),
        reason: "expected an array".into(),
    })?;
    let parts: Vec<String> = items.iter().map(crate::template::stringify).collect();
    Ok(Value::String(parts.join(separator)))
}

#[async_trait]
impl ActionHandler for TransformHandler {
    fn step_type(&self) -> &str {
        "transform"
    }

    fn actions(&self) -> &[&str] {
        &["extract", "format", "join"]
    }

    async fn perform(&self, action: &str, params: &Params) -> Result<Value, ActionError> {
        match action {
            "extract" => extract(params),
            "format" => Ok(Value::String(required_str(params, "template")?.to_string())),
            "join" => join(params),
            other => Err(ActionError::Unsupported(other.to_string())),
        }
    }
}
