pub mod calculator;
pub mod executor;
pub mod filesystem;
pub mod registry;
pub mod schema;
pub mod text_analysis;

pub use calculator::CalculatorTool;
pub use executor::ToolExecutor;
pub use filesystem::{FileOperationTool, SafeFs};
pub use registry::{InvocationResult, Tool, ToolMetadata, ToolRegistry, ToolStats};
pub use schema::{function_schema, tool_call_schema_json, ParamType, ToolParameter};
pub use text_analysis::TextAnalysisTool;
