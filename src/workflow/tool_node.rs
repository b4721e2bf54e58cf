//! 工具节点（tool_node）
//!
//! 取出协调步骤留下的工具指令并执行，把结果暂存到 tool_output，
//! 由下一次协调步骤合并进累积状态。工具节点之后总是回到 core_agent。

use chrono::Utc;

use crate::core::{AgentError, ConversationState};
use crate::tools::{ToolContext, ToolExecutor};
use crate::workflow::trace::DebugEntry;
use crate::workflow::types::{transition, Node, StepEvent, WorkflowError};

pub struct ToolNode {
    executor: ToolExecutor,
}

impl ToolNode {
    pub fn new(executor: ToolExecutor) -> Self {
        Self { executor }
    }

    /// 执行一次工具步骤；工具失败原样向上传播
    pub async fn run(&self, mut state: ConversationState) -> Result<ConversationState, AgentError> {
        let call = state
            .pending_call
            .take()
            .ok_or(WorkflowError::MissingToolCall)?;

        let ctx = ToolContext {
            messages: &state.messages,
            trigger_type: state.trigger_type,
        };
        let output = self.executor.execute(&call, ctx).await?;
        let kind = output.kind();

        state.tool_output = Some(output);
        state.next_step = transition(Node::ToolNode, StepEvent::ToolCompleted)?;
        state.debug_log.record(DebugEntry {
            step: state.step_counter,
            node: Node::ToolNode,
            detail: format!("executed {} -> {:?}", call.tool, kind),
            next_step: state.next_step,
            met_goal: state.met_goal,
            trigger_type: state.trigger_type,
            at: Utc::now(),
        });
        Ok(state)
    }
}
