//! 工作流类型定义
//!
//! 状态机的封闭状态集合 Node、步骤事件 StepEvent 与转移函数 transition。
//! 「工具执行后总是回到协调步骤」由 ToolCompleted 只有一个合法目标来保证。

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 状态机节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// 协调步骤：调用 LLM，决定结束、继续或调用工具
    CoreAgent,
    /// 工具调度：执行协调步骤给出的单条指令
    ToolNode,
    /// 终态
    End,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::CoreAgent => "core_agent",
            Node::ToolNode => "tool_node",
            Node::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::End)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 协调步骤的决策结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorOutcome {
    /// 解析出工具指令
    Dispatch,
    /// 未结束且无指令
    Continue,
    /// 状态为 END 且无指令
    Finish,
}

impl CoordinatorOutcome {
    /// 指令优先于状态：即使 END，只要有指令也先执行工具
    pub fn decide(ended: bool, has_directive: bool) -> Self {
        if has_directive {
            CoordinatorOutcome::Dispatch
        } else if ended {
            CoordinatorOutcome::Finish
        } else {
            CoordinatorOutcome::Continue
        }
    }
}

/// 驱动状态转移的事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Coordinator(CoordinatorOutcome),
    ToolCompleted,
    BudgetExhausted,
}

/// 状态转移函数：(当前节点, 事件) -> 下一节点
pub fn transition(from: Node, event: StepEvent) -> Result<Node, WorkflowError> {
    match (from, event) {
        (_, StepEvent::BudgetExhausted) => Ok(Node::End),
        (Node::CoreAgent, StepEvent::Coordinator(CoordinatorOutcome::Dispatch)) => Ok(Node::ToolNode),
        (Node::CoreAgent, StepEvent::Coordinator(CoordinatorOutcome::Continue)) => Ok(Node::CoreAgent),
        (Node::CoreAgent, StepEvent::Coordinator(CoordinatorOutcome::Finish)) => Ok(Node::End),
        (Node::ToolNode, StepEvent::ToolCompleted) => Ok(Node::CoreAgent),
        (from, event) => Err(WorkflowError::InvalidTransition {
            from,
            event: format!("{:?}", event),
        }),
    }
}

/// 工作流错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: Node, event: String },
    #[error("Tool node reached without a pending tool call")]
    MissingToolCall,
    #[error("Invalid workflow configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_transitions() {
        let t = |o| transition(Node::CoreAgent, StepEvent::Coordinator(o)).unwrap();
        assert_eq!(t(CoordinatorOutcome::Dispatch), Node::ToolNode);
        assert_eq!(t(CoordinatorOutcome::Continue), Node::CoreAgent);
        assert_eq!(t(CoordinatorOutcome::Finish), Node::End);
    }

    #[test]
    fn test_tool_node_always_returns_to_coordinator() {
        assert_eq!(
            transition(Node::ToolNode, StepEvent::ToolCompleted).unwrap(),
            Node::CoreAgent
        );
        assert!(transition(
            Node::ToolNode,
            StepEvent::Coordinator(CoordinatorOutcome::Finish)
        )
        .is_err());
    }

    #[test]
    fn test_budget_exhaustion_ends_from_any_node() {
        for node in [Node::CoreAgent, Node::ToolNode, Node::End] {
            assert_eq!(transition(node, StepEvent::BudgetExhausted).unwrap(), Node::End);
        }
    }

    #[test]
    fn test_end_is_terminal() {
        assert!(transition(Node::End, StepEvent::ToolCompleted).is_err());
        assert!(Node::End.is_terminal());
        assert!(!Node::CoreAgent.is_terminal());
    }

    #[test]
    fn test_directive_takes_precedence_over_end() {
        assert_eq!(CoordinatorOutcome::decide(true, true), CoordinatorOutcome::Dispatch);
        assert_eq!(CoordinatorOutcome::decide(true, false), CoordinatorOutcome::Finish);
        assert_eq!(CoordinatorOutcome::decide(false, false), CoordinatorOutcome::Continue);
    }

    #[test]
    fn test_node_names() {
        assert_eq!(Node::CoreAgent.to_string(), "core_agent");
        assert_eq!(serde_json::to_string(&Node::ToolNode).unwrap(), "\"tool_node\"");
    }
}
