//! 多步编排状态机
//!
//! core_agent（协调步骤）与 tool_node（工具节点）交替执行，由 WorkflowEngine 驱动，
//! 受步数预算约束；每一步向 ConversationState.debug_log 追加一条记录。

pub mod builder;
pub mod coordinator;
pub mod engine;
pub mod parser;
pub mod tool_node;
pub mod trace;
pub mod types;

pub use builder::RunRequest;
pub use coordinator::{build_system_prompt, load_persona, Coordinator, DEFAULT_PERSONA};
pub use engine::{WorkflowEngine, BUDGET_APOLOGY, DEFAULT_MAX_STEPS};
pub use parser::{parse_completion, split_segments, ParseError, ParsedCompletion, Status, ToolCall};
pub use tool_node::ToolNode;
pub use trace::{DebugEntry, DebugTrace};
pub use types::{transition, CoordinatorOutcome, Node, StepEvent, WorkflowError};
