//! 工作流引擎
//!
//! 核心执行循环：按 next_step 在协调步骤与工具节点之间交替，直到 END 或步数预算耗尽。
//! 状态按值在步骤间传递，同一时刻只有一个步骤持有它。

use crate::core::{AgentError, ConversationState};
use crate::memory::Message;
use crate::workflow::builder::RunRequest;
use crate::workflow::coordinator::Coordinator;
use crate::workflow::tool_node::ToolNode;
use crate::workflow::types::{transition, Node, StepEvent, WorkflowError};

/// 默认步数预算（协调步骤调用次数上限）
pub const DEFAULT_MAX_STEPS: u32 = 5;

/// 预算耗尽时追加给用户的系统消息
pub const BUDGET_APOLOGY: &str =
    "I'm sorry, we've reached the limit for this conversation turn. Let's pick this up again in your next message.";

/// 工作流引擎
pub struct WorkflowEngine {
    coordinator: Coordinator,
    tool_node: ToolNode,
    max_steps: u32,
}

impl WorkflowEngine {
    /// 创建引擎；max_steps 必须大于 0
    pub fn new(coordinator: Coordinator, tool_node: ToolNode, max_steps: u32) -> Result<Self, WorkflowError> {
        if max_steps == 0 {
            return Err(WorkflowError::InvalidConfiguration(
                "max_steps must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            coordinator,
            tool_node,
            max_steps,
        })
    }

    /// 从请求构建初始状态并运行到结束
    pub async fn run(&self, request: RunRequest) -> Result<ConversationState, AgentError> {
        self.run_state(request.into_state()).await
    }

    /// 从给定状态运行到结束，返回最终状态（含完整调试轨迹）
    pub async fn run_state(&self, mut state: ConversationState) -> Result<ConversationState, AgentError> {
        tracing::debug!(
            session_id = %state.session_id,
            max_steps = self.max_steps,
            "workflow run started"
        );

        loop {
            match state.next_step {
                Node::End => break,
                Node::CoreAgent => {
                    state = self.coordinator.run(state).await?;
                    tracing::debug!(
                        step = state.step_counter,
                        next = %state.next_step,
                        "coordinator step done"
                    );
                    if state.step_counter >= self.max_steps {
                        self.exhaust_budget(&mut state)?;
                    }
                }
                Node::ToolNode => {
                    state = self.tool_node.run(state).await?;
                }
            }
        }

        tracing::debug!(
            session_id = %state.session_id,
            steps = state.step_counter,
            trace_len = state.debug_log.len(),
            "workflow run finished"
        );
        Ok(state)
    }

    /// 预算耗尽：强制结束并追加道歉消息，优先于 END
    fn exhaust_budget(&self, state: &mut ConversationState) -> Result<(), WorkflowError> {
        tracing::warn!(
            session_id = %state.session_id,
            step = state.step_counter,
            max_steps = self.max_steps,
            dropped_tool = state.pending_call.as_ref().map(|c| c.tool.as_str()).unwrap_or("none"),
            "step budget exhausted, ending run"
        );
        state.next_step = transition(state.next_step, StepEvent::BudgetExhausted)?;
        state.conversation_ended = true;
        state.pending_call = None;
        state.messages.push(Message::system(BUDGET_APOLOGY));
        if let Some(last) = state.debug_log.last_mut() {
            last.next_step = state.next_step;
            last.detail.push_str(" [budget exhausted]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::llm::MockLlmClient;
    use crate::tools::{AlcoholCalculatorTool, ToolExecutor, ToolRegistry};
    use crate::workflow::coordinator::DEFAULT_PERSONA;

    const TOOL_TURN: &str = "CONTINUE\n---\nChecking.\n---\n{\"tool\": \"calculate_alcohol\", \"args\": {\"beverage_type\": \"wine\", \"quantity\": 1}}";

    fn engine(mock: Arc<MockLlmClient>, max_steps: u32) -> WorkflowEngine {
        let mut registry = ToolRegistry::new();
        registry.register(AlcoholCalculatorTool::new());
        let coordinator = Coordinator::new(mock, &registry, DEFAULT_PERSONA);
        let tool_node = ToolNode::new(ToolExecutor::new(registry, 5));
        WorkflowEngine::new(coordinator, tool_node, max_steps).unwrap()
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let mock = Arc::new(MockLlmClient::new());
        let mut registry = ToolRegistry::new();
        registry.register(AlcoholCalculatorTool::new());
        let coordinator = Coordinator::new(mock, &registry, DEFAULT_PERSONA);
        let tool_node = ToolNode::new(ToolExecutor::new(registry, 5));
        assert!(matches!(
            WorkflowEngine::new(coordinator, tool_node, 0),
            Err(WorkflowError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_tool_round_trip_then_end() {
        let mock = Arc::new(MockLlmClient::with_responses([
            TOOL_TURN,
            "END\n---\nOne glass is 18 mL, within your goal.\n---\n",
        ]));
        let state = engine(mock.clone(), DEFAULT_MAX_STEPS)
            .run(RunRequest::new(vec![Message::user("I had a glass of wine")]))
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 2);
        assert_eq!(state.step_counter, 2);
        assert!(state.conversation_ended);
        assert_eq!(state.next_step, Node::End);
        assert_eq!(state.met_goal, Some(true));
        assert_eq!(state.beverage_logs.len(), 1);
        // core_agent, tool_node, core_agent
        assert_eq!(state.debug_log.len(), 3);
        assert_eq!(
            state.last_message(),
            Some(&Message::assistant("One glass is 18 mL, within your goal."))
        );
    }

    #[tokio::test]
    async fn test_budget_stops_endless_tool_requests() {
        let mock = Arc::new(MockLlmClient::with_responses(std::iter::repeat(TOOL_TURN).take(10)));
        let state = engine(mock.clone(), 3)
            .run(RunRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 3);
        assert_eq!(state.step_counter, 3);
        assert!(state.conversation_ended);
        assert_eq!(state.next_step, Node::End);
        assert!(state.pending_call.is_none());
        assert_eq!(state.last_message(), Some(&Message::system(BUDGET_APOLOGY)));
        // 3 次协调 + 2 次工具
        assert_eq!(state.debug_log.len(), 5);
    }

    #[tokio::test]
    async fn test_budget_takes_precedence_over_end() {
        let mock = Arc::new(MockLlmClient::with_responses(["END\n---\nBye!\n---\n"]));
        let state = engine(mock, 1)
            .run(RunRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert!(state.conversation_ended);
        assert_eq!(state.last_message(), Some(&Message::system(BUDGET_APOLOGY)));
    }
}
