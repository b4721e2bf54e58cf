//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(call, ctx) 在超时内调用 registry.execute，
//! 超时返回 ToolTimeout，其余错误原样传播；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::{AgentError, ToolOutput};
use crate::tools::{ToolContext, ToolRegistry};
use crate::workflow::parser::ToolCall;

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一条工具指令；输出 JSON 审计日志
    pub async fn execute(
        &self,
        call: &ToolCall,
        ctx: ToolContext<'_>,
    ) -> Result<ToolOutput, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&call.args);
        let result = timeout(
            self.timeout,
            self.registry.execute(&call.tool, call.args.clone(), ctx),
        )
        .await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AgentError::ToolTimeout(call.tool.clone())),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
