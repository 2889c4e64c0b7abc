//! Calculator tool.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, RoundtableError};
use crate::tool::Tool;

/// Integer arithmetic over two operands. Division truncates toward zero;
/// dividing by zero is a tool error, surfaced through the ordinary
/// tool-result path.
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform a math operation on two integers. Expects {\"a\": integer, \"b\": integer, \"operator\": \"+\"|\"-\"|\"*\"|\"/\"}."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "a": { "type": "integer" },
                "b": { "type": "integer" },
                "operator": { "type": "string", "enum": ["+", "-", "*", "/"] },
            },
            "required": ["a", "b", "operator"],
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let a = get_int(&input, "a")?;
        let b = get_int(&input, "b")?;
        let operator = input
            .get("operator")
            .and_then(Value::as_str)
            .ok_or_else(|| RoundtableError::Agent("missing `operator` for calculator".into()))?;

        let result = match operator {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            "/" => {
                if b == 0 {
                    return Err(RoundtableError::Agent("division by zero".into()));
                }
                a / b
            }
            other => {
                return Err(RoundtableError::Agent(format!("invalid operator `{other}`")));
            }
        };

        Ok(json!(result))
    }
}

fn get_int(input: &Value, field: &str) -> Result<i64> {
    input
        .get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| RoundtableError::Agent(format!("missing `{field}` for calculator")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn adds_two_numbers() {
        let result = CalculatorTool.call(json!({"a": 3, "b": 4, "operator": "+"})).await.unwrap();
        assert_eq!(result, json!(7));
    }

    #[tokio::test]
    async fn division_truncates_toward_zero() {
        let result = CalculatorTool.call(json!({"a": 7, "b": 2, "operator": "/"})).await.unwrap();
        assert_eq!(result, json!(3));
    }

    #[tokio::test]
    async fn division_by_zero_is_an_error() {
        assert!(CalculatorTool
            .call(json!({"a": 1, "b": 0, "operator": "/"}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn rejects_unknown_operator() {
        assert!(CalculatorTool
            .call(json!({"a": 1, "b": 2, "operator": "%"}))
            .await
            .is_err());
    }
}
