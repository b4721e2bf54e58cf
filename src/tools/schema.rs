//! 工具指令 JSON Schema 生成（schemars）
//!
//! 将「合法指令」的 JSON 结构注入协调步骤的 system 指令，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use std::collections::HashMap;

/// 指令格式：与 workflow::parser::ToolCall 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 calculate_alcohol、identify_trigger、suggest_coping
    pub tool: String,
    /// 工具参数对象，依工具不同而不同；无参数时为 {}
    pub args: HashMap<String, serde_json::Value>,
}

/// 返回工具指令的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 为某个参数结构生成 schema（供各工具的 parameters_schema 使用）
pub fn args_schema<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_schema_has_required_fields() {
        let schema = tool_call_schema_json();
        assert!(schema.contains("\"tool\""));
        assert!(schema.contains("\"args\""));
        assert!(schema.contains("required"));
    }
}
