//! 协调步骤（core_agent）
//!
//! 状态机唯一的决策点：先合并上一次工具结果，再带上累积上下文摘要与完整对话调用一次 LLM，
//! 解析出状态、用户可见消息与至多一条工具指令，最后写入 next_step 并追加一条调试记录。

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::core::{AgentError, ConversationState};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::{tool_call_schema_json, ToolRegistry};
use crate::workflow::parser::{parse_completion, Status};
use crate::workflow::trace::DebugEntry;
use crate::workflow::types::{transition, CoordinatorOutcome, Node, StepEvent};

/// 默认人设（可由 prompts 目录下的 core_agent.txt 覆盖）
pub const DEFAULT_PERSONA: &str = "\
### Role
You are SipControl, a compassionate coach helping people cut down on or quit alcohol through personalised, empathetic support.

### Goals
- Support users through daily check-ins, motivational nudges and relapse prevention.
- Celebrate progress and milestones warmly.
- Offer coping strategies during cravings or tough moments.

### Behaviour
- Be positive, encouraging, patient and non-judgmental; progress over perfection.
- Offer helpful suggestions, never criticism.
- Never give medical advice. Prioritise the user's emotional safety.";

const OUTPUT_FORMAT: &str = "\
### Output format
Always answer in exactly three parts separated by lines containing only ---

<STATUS>
---
<message to the user>
---
<tool call or empty>

STATUS is CONTINUE if the conversation should go on, or END if this reply closes it.
The third part is either empty or a single JSON tool call matching this schema (one tool per turn):";

/// 从 prompts 目录读取人设，找不到时使用默认
pub fn load_persona(prompts_dir: Option<&Path>) -> String {
    let candidates = match prompts_dir {
        Some(dir) => vec![dir.join("core_agent.txt")],
        None => vec![
            Path::new("config/prompts/core_agent.txt").to_path_buf(),
            Path::new("../config/prompts/core_agent.txt").to_path_buf(),
        ],
    };
    candidates
        .into_iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_PERSONA.to_string())
}

/// 组装协调步骤的 system 指令：人设 + 输出格式 + 指令 schema + 可用工具
pub fn build_system_prompt(persona: &str, registry: &ToolRegistry) -> String {
    let tools = registry
        .tool_descriptions()
        .into_iter()
        .map(|(name, desc)| format!("- {}: {}", name, desc))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\n{}\n{}\n\n### Available tools\n{}\n\nTool parameter schemas:\n{}",
        persona,
        OUTPUT_FORMAT,
        tool_call_schema_json(),
        tools,
        registry.to_schema_json()
    )
}

/// 协调步骤
pub struct Coordinator {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    tool_names: Vec<String>,
}

impl Coordinator {
    pub fn new(llm: Arc<dyn LlmClient>, registry: &ToolRegistry, persona: &str) -> Self {
        Self {
            llm,
            system_prompt: build_system_prompt(persona, registry),
            tool_names: registry.tool_names(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 执行一次协调步骤
    pub async fn run(&self, mut state: ConversationState) -> Result<ConversationState, AgentError> {
        let merged = state.merge_tool_output();
        state.step_counter += 1;

        let mut request = Vec::with_capacity(state.messages.len() + 2);
        request.push(Message::system(self.system_prompt.clone()));
        request.push(Message::system(format!(
            "Current conversation context:\n{}",
            state.context_summary()
        )));
        request.extend_from_slice(&state.messages);

        let raw = self.llm.complete(&request).await?;

        let (parsed, parse_error) = match parse_completion(&raw) {
            Ok(parsed) => (parsed, None),
            Err(e) => {
                tracing::warn!(error = %e, step = state.step_counter, "malformed completion, degrading");
                (e.clone().degrade(), Some(e))
            }
        };

        let mut notes = Vec::new();
        if let Some(kind) = merged {
            notes.push(format!("merged {:?}", kind));
        }
        if let Some(e) = &parse_error {
            notes.push(format!("parse error: {}", e));
        }

        let directive = match parsed.directive {
            Some(call) if !self.tool_names.iter().any(|n| n == &call.tool) => {
                tracing::warn!(tool = %call.tool, "directive names an unregistered tool, dropping");
                notes.push(format!("unknown tool {}", call.tool));
                None
            }
            other => other,
        };

        state.conversation_ended = parsed.status == Status::End;
        state.messages.push(Message::assistant(parsed.message));

        let outcome = CoordinatorOutcome::decide(state.conversation_ended, directive.is_some());
        state.next_step = transition(Node::CoreAgent, StepEvent::Coordinator(outcome))?;

        let mut detail = format!(
            "status={:?} directive={}",
            parsed.status,
            directive.as_ref().map(|c| c.tool.as_str()).unwrap_or("none")
        );
        if !notes.is_empty() {
            detail.push_str(&format!(" ({})", notes.join("; ")));
        }
        state.pending_call = directive;

        let entry = DebugEntry {
            step: state.step_counter,
            node: Node::CoreAgent,
            detail,
            next_step: state.next_step,
            met_goal: state.met_goal,
            trigger_type: state.trigger_type,
            at: Utc::now(),
        };
        state.debug_log.record(entry);

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BeverageLog, SessionType, ToolOutput};
    use crate::llm::{LlmError, MockLlmClient};
    use crate::tools::{AlcoholCalculatorTool, ToolRegistry};

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(AlcoholCalculatorTool::new());
        r
    }

    fn state() -> ConversationState {
        ConversationState::new(
            vec![Message::user("I had two beers")],
            "s".to_string(),
            "u".to_string(),
            SessionType::DailyCheckin,
        )
    }

    #[tokio::test]
    async fn test_end_without_directive_finishes() {
        let mock = Arc::new(MockLlmClient::with_responses(["END\n---\nWell done today!\n---\n"]));
        let c = Coordinator::new(mock.clone(), &registry(), DEFAULT_PERSONA);
        let s = c.run(state()).await.unwrap();
        assert!(s.conversation_ended);
        assert_eq!(s.next_step, Node::End);
        assert_eq!(s.step_counter, 1);
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.last_message(), Some(&Message::assistant("Well done today!")));
        assert_eq!(s.debug_log.len(), 1);
    }

    #[tokio::test]
    async fn test_directive_routes_to_tool_node() {
        let mock = Arc::new(MockLlmClient::with_responses([
            "CONTINUE\n---\nLet me check.\n---\n{\"tool\": \"calculate_alcohol\", \"args\": {\"beverage_type\": \"beer\", \"quantity\": 2, \"unit\": \"bottle\"}}",
        ]));
        let c = Coordinator::new(mock, &registry(), DEFAULT_PERSONA);
        let s = c.run(state()).await.unwrap();
        assert_eq!(s.next_step, Node::ToolNode);
        assert_eq!(s.pending_call.as_ref().unwrap().tool, "calculate_alcohol");
        assert!(!s.conversation_ended);
    }

    #[tokio::test]
    async fn test_continue_without_directive_loops_back() {
        let mock = Arc::new(MockLlmClient::with_responses(["CONTINUE\n---\nTell me more?\n---\n"]));
        let c = Coordinator::new(mock, &registry(), DEFAULT_PERSONA);
        let s = c.run(state()).await.unwrap();
        assert_eq!(s.next_step, Node::CoreAgent);
        assert!(s.pending_call.is_none());
    }

    #[tokio::test]
    async fn test_malformed_completion_degrades_to_empty_continue() {
        let mock = Arc::new(MockLlmClient::with_responses(["no structure at all"]));
        let c = Coordinator::new(mock, &registry(), DEFAULT_PERSONA);
        let s = c.run(state()).await.unwrap();
        assert!(!s.conversation_ended);
        assert_eq!(s.next_step, Node::CoreAgent);
        assert_eq!(s.last_message(), Some(&Message::assistant("")));
        assert!(s.debug_log.entries()[0].detail.contains("parse error"));
    }

    #[tokio::test]
    async fn test_unregistered_tool_is_dropped() {
        let mock = Arc::new(MockLlmClient::with_responses([
            "END\n---\nBye\n---\n{\"tool\": \"book_flight\", \"args\": {}}",
        ]));
        let c = Coordinator::new(mock, &registry(), DEFAULT_PERSONA);
        let s = c.run(state()).await.unwrap();
        assert!(s.pending_call.is_none());
        assert_eq!(s.next_step, Node::End);
        let detail = &s.debug_log.entries()[0].detail;
        assert!(detail.contains("unknown tool book_flight"));
        assert!(!detail.contains("invalid tool directive"));
    }

    #[tokio::test]
    async fn test_merges_pending_tool_output_before_calling_llm() {
        let mock = Arc::new(MockLlmClient::with_responses(["END\n---\nThat is 75 mL.\n---\n"]));
        let c = Coordinator::new(mock.clone(), &registry(), DEFAULT_PERSONA);
        let mut s = state();
        s.tool_output = Some(ToolOutput::AlcoholResult(BeverageLog {
            beverage_type: "beer".to_string(),
            quantity: 2.0,
            unit: "bottle".to_string(),
            abv: 0.05,
            total_volume_ml: 1500.0,
            total_pure_alcohol_ml: 75.0,
            daily_goal_ml: 30.0,
            met_goal: false,
        }));
        let s = c.run(s).await.unwrap();
        assert_eq!(s.beverage_logs.len(), 1);
        assert_eq!(s.met_goal, Some(false));
        assert!(s.tool_output.is_none());

        let request = mock.last_request().unwrap();
        assert_eq!(request[0].content, c.system_prompt());
        assert!(request[1].content.contains("\"met_goal\": false"));
        assert_eq!(request[2], Message::user("I had two beers"));
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error(LlmError::ApiError("503".to_string()));
        let c = Coordinator::new(mock, &registry(), DEFAULT_PERSONA);
        assert!(matches!(c.run(state()).await, Err(AgentError::Llm(_))));
    }

    #[test]
    fn test_system_prompt_lists_tools_and_format() {
        let prompt = build_system_prompt(DEFAULT_PERSONA, &registry());
        assert!(prompt.contains("calculate_alcohol"));
        assert!(prompt.contains("CONTINUE"));
        assert!(prompt.contains("---"));
    }

    #[test]
    fn test_load_persona_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("core_agent.txt"), "Custom persona\n").unwrap();
        assert_eq!(load_persona(Some(dir.path())), "Custom persona");

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(load_persona(Some(empty.path())), DEFAULT_PERSONA);
    }
}
