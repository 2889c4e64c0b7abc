use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tool::Tool;

/// Fixed-value time lookup, handy for deterministic demos and tests.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current time as HH:MM:SS. Takes no arguments."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({ "type": "object", "properties": {} }))
    }

    async fn call(&self, _input: Value) -> Result<Value> {
        Ok(json!("12:00:00"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_fixed_time() {
        let result = CurrentTimeTool.call(json!({})).await.unwrap();
        assert_eq!(result, json!("12:00:00"));
    }
}
