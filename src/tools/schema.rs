//! 工具参数声明与 Schema 生成
//!
//! ToolParameter 描述单个参数（名称、类型、是否必填、默认值）；function_schema 将其转为
//! function-calling 风格的 `{name, description, input_schema}`；tool_call_schema_json 用 schemars
//! 生成「合法 tool call」的 JSON 结构。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 参数类型标签（与 JSON Schema 的 type 对应）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

/// 工具声明的单个参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParameter {
    /// 必填参数
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// 可选参数
    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// 生成单个工具的 function-calling schema
pub fn function_schema(name: &str, description: &str, parameters: &[ToolParameter]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in parameters {
        let mut prop = serde_json::json!({
            "type": param.param_type.as_str(),
            "description": param.description,
        });
        if let (Some(default), Some(obj)) = (&param.default, prop.as_object_mut()) {
            obj.insert("default".to_string(), default.clone());
        }
        properties.insert(param.name.clone(), prop);
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }
    serde_json::json!({
        "name": name,
        "description": description,
        "input_schema": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

/// 工具调用请求格式：`{"tool": "...", "args": {...}}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 calculator、text_analysis、file_operation
    pub tool: String,
    /// 工具参数，依工具不同而不同（operation、a、b、text、path 等）
    pub args: HashMap<String, Value>,
}

/// 返回工具调用的 JSON Schema 字符串
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
