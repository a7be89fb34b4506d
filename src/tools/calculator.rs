//! 计算器工具：add / subtract / multiply / divide / power / sqrt / sin / cos / tan

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::schema::{ParamType, ToolParameter};
use crate::tools::Tool;

const BINARY_OPS: [&str; 5] = ["add", "subtract", "multiply", "divide", "power"];
const UNARY_OPS: [&str; 4] = ["sqrt", "sin", "cos", "tan"];

/// 计算器工具
pub struct CalculatorTool;

/// 数字参数既接受 JSON number，也接受可解析的字符串
fn number_arg(args: &Value, key: &str) -> Option<f64> {
    match args.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform mathematical operations: add, subtract, multiply, divide, power, sqrt, sin, cos, tan"
    }

    fn category(&self) -> &str {
        "computation"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::required(
                "operation",
                ParamType::String,
                "Operation: add, subtract, multiply, divide, power, sqrt, sin, cos, tan",
            ),
            ToolParameter::required("a", ParamType::Number, "First number"),
            ToolParameter::optional(
                "b",
                ParamType::Number,
                "Second number (not required for sqrt, sin, cos, tan)",
            ),
        ]
    }

    fn validate(&self, args: &Value) -> bool {
        let Some(op) = args.get("operation").and_then(|v| v.as_str()) else {
            return false;
        };
        if number_arg(args, "a").is_none() {
            return false;
        }
        if BINARY_OPS.contains(&op) {
            number_arg(args, "b").is_some()
        } else {
            UNARY_OPS.contains(&op)
        }
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let op = args
            .get("operation")
            .and_then(|v| v.as_str())
            .ok_or("missing operation")?;
        let a = number_arg(&args, "a").ok_or("missing operand a")?;
        let b = number_arg(&args, "b").unwrap_or(0.0);

        let value = match op {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" => {
                if b == 0.0 {
                    return Err("Division by zero".to_string());
                }
                a / b
            }
            "power" => a.powf(b),
            "sqrt" => {
                if a < 0.0 {
                    return Err(format!("Cannot take square root of negative number {}", a));
                }
                a.sqrt()
            }
            "sin" => a.sin(),
            "cos" => a.cos(),
            "tan" => a.tan(),
            other => return Err(format!("Unsupported operation: {}", other)),
        };

        if !value.is_finite() {
            return Err(format!("Result of {} is not a finite number", op));
        }
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| format!("Result of {} is not representable", op))
    }
}
