//! Agent 错误类型
//!
//! LLM 调用失败与工具执行失败都会向调用方传播并中止本次运行；
//! 格式错误的补全不在此列，由协调步骤降级处理（见 workflow::parser::ParseError）。

use thiserror::Error;

use crate::llm::LlmError;
use crate::workflow::types::WorkflowError;

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidToolArgs { tool: String, reason: String },

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}
