//! 工作流集成测试：整轮运行的终止、轨迹、分派与错误传播

use std::sync::Arc;

use sipcontrol::agent::{create_agent_components_with_llm, AgentComponents};
use sipcontrol::config::AppConfig;
use sipcontrol::core::{AgentError, ConversationState, SessionType, TriggerType};
use sipcontrol::llm::{LlmError, MockLlmClient};
use sipcontrol::memory::{Message, Role};
use sipcontrol::tools::CopingStrategies;
use sipcontrol::workflow::{Node, RunRequest, BUDGET_APOLOGY};

const ALWAYS_TOOL: &str = "CONTINUE\n---\nLet me log that.\n---\n{\"tool\": \"calculate_alcohol\", \"args\": {\"beverage_type\": \"beer\", \"quantity\": 1, \"unit\": \"can\"}}";

fn components(mock: Arc<MockLlmClient>, max_steps: u32) -> AgentComponents {
    let mut cfg = AppConfig::default();
    cfg.llm.provider = "mock".to_string();
    cfg.workflow.max_steps = max_steps;
    create_agent_components_with_llm(&cfg, mock).unwrap()
}

async fn run(components: &AgentComponents, text: &str) -> Result<ConversationState, AgentError> {
    components
        .engine
        .run(
            RunRequest::new(vec![Message::user(text)])
                .user_id("it_user")
                .session_type(SessionType::DailyCheckin),
        )
        .await
}

fn assert_trace_consistent(state: &ConversationState, executions: usize) {
    let entries = state.debug_log.entries();
    assert_eq!(entries.len(), executions);
    assert!(entries.windows(2).all(|w| w[0].step <= w[1].step));
    assert_eq!(entries.last().map(|e| e.next_step), Some(Node::End));
}

#[tokio::test]
async fn test_budget_exhaustion_for_several_budgets() {
    for n in [1u32, 3, 5] {
        let mock = Arc::new(MockLlmClient::with_responses(
            std::iter::repeat(ALWAYS_TOOL).take(20),
        ));
        let c = components(mock.clone(), n);
        let state = run(&c, "had a beer").await.unwrap();

        assert_eq!(mock.call_count(), n as usize, "budget {}", n);
        assert_eq!(state.step_counter, n);
        assert!(state.conversation_ended);
        assert_eq!(state.next_step, Node::End);
        assert_eq!(state.last_message(), Some(&Message::system(BUDGET_APOLOGY)));
        // n 次协调 + n-1 次工具
        assert_trace_consistent(&state, (2 * n - 1) as usize);
        assert_eq!(state.beverage_logs.len(), (n - 1) as usize);
    }
}

#[tokio::test]
async fn test_end_on_first_step_runs_once() {
    let mock = Arc::new(MockLlmClient::with_responses([
        "END\n---\nGreat to hear from you, talk tomorrow!\n---\n",
    ]));
    let c = components(mock.clone(), 5);
    let state = run(&c, "Just checking in, no drinks today.").await.unwrap();

    assert_eq!(mock.call_count(), 1);
    assert_eq!(state.step_counter, 1);
    assert_eq!(state.messages.len(), 2);
    assert!(state.conversation_ended);
    assert!(state.beverage_logs.is_empty());
    assert_eq!(state.met_goal, None);
    assert_trace_consistent(&state, 1);
}

#[tokio::test]
async fn test_calculator_results_are_merged() {
    let mock = Arc::new(MockLlmClient::with_responses([
        "CONTINUE\n---\nLet me check.\n---\n{\"tool\": \"calculate_alcohol\", \"args\": {\"beverage_type\": \"beer\", \"quantity\": 2, \"unit\": \"bottle\"}}",
        "END\n---\nThat's 75 mL, over your 30 mL goal. Tomorrow is a new day.\n---\n",
    ]));
    let c = components(mock, 5);
    let state = run(&c, "I had 2 bottles of beer").await.unwrap();

    assert_eq!(state.met_goal, Some(false));
    let log = &state.beverage_logs[0];
    assert_eq!(log.total_volume_ml, 1500.0);
    assert_eq!(log.abv, 0.05);
    assert_eq!(log.total_pure_alcohol_ml, 75.0);
    assert_trace_consistent(&state, 3);
    let entries = state.debug_log.entries();
    assert_eq!(entries[0].met_goal, None);
    assert_eq!(entries[2].met_goal, Some(false));

    let mock = Arc::new(MockLlmClient::with_responses([
        "CONTINUE\n---\nLet me check.\n---\n{\"tool\": \"calculate_alcohol\", \"args\": {\"beverage_type\": \"wine\", \"quantity\": 1, \"unit\": \"glass\"}}",
        "END\n---\nOnly 18 mL, nicely within your goal.\n---\n",
    ]));
    let c = components(mock, 5);
    let state = run(&c, "one glass of wine").await.unwrap();
    assert_eq!(state.met_goal, Some(true));
    assert_eq!(state.beverage_logs[0].total_pure_alcohol_ml, 18.0);
}

async fn run_trigger_flow(classifier_answer: &str) -> (ConversationState, Vec<Vec<Message>>) {
    let mock = Arc::new(MockLlmClient::with_responses([
        "CONTINUE\n---\nI hear you. Let me understand what's behind this.\n---\n{\"tool\": \"identify_trigger\", \"args\": {}}",
        classifier_answer,
        "CONTINUE\n---\nHere are a few ideas.\n---\n{\"tool\": \"suggest_coping\", \"args\": {}}",
        "Try a ten minute walk.",
        "END\n---\nYou've got this.\n---\n",
    ]));
    let c = components(mock.clone(), 5);
    let state = run(&c, "I really want a drink right now.").await.unwrap();
    (state, mock.requests())
}

#[tokio::test]
async fn test_trigger_dispatch_covers_all_branches() {
    let strategies = CopingStrategies::default();
    let cases = [
        ("stress\n---\nWork deadlines.", TriggerType::Stress),
        ("social_pressure\n---\nFriends insist.", TriggerType::SocialPressure),
        ("boredom\n---\nNothing to do.", TriggerType::Boredom),
        ("loneliness\n---\nLives alone.", TriggerType::Unknown),
    ];

    for (answer, expected) in cases {
        let (state, requests) = run_trigger_flow(answer).await;
        assert_eq!(state.trigger_type, Some(expected));
        assert_eq!(requests.len(), 5);

        // 第 4 次调用是应对策略生成
        let coping_system = &requests[3][0];
        assert_eq!(coping_system.role, Role::System);
        assert_eq!(
            coping_system.content,
            strategies.select(Some(expected)).system_prompt(),
            "trigger {:?}",
            expected
        );

        assert!(state
            .messages
            .iter()
            .any(|m| m.role == Role::System && m.content.starts_with("Identified drinking trigger")));
        assert!(state
            .messages
            .contains(&Message::assistant("Try a ten minute walk.")));
        assert_trace_consistent(&state, 5);

        // 轨迹快照：识别前未设置，合并后的协调步骤带上触发因素
        let entries = state.debug_log.entries();
        assert_eq!(entries[0].trigger_type, None);
        assert_eq!(
            entries.last().and_then(|e| e.trigger_type),
            Some(expected),
            "trigger {:?}",
            expected
        );
    }
}

#[tokio::test]
async fn test_completion_failure_propagates() {
    let mock = Arc::new(MockLlmClient::with_responses([
        "CONTINUE\n---\nOne moment.\n---\n{\"tool\": \"identify_trigger\", \"args\": {}}",
    ]));
    mock.push_error(LlmError::ApiError("service unavailable".to_string()));
    let c = components(mock, 5);
    let err = run(&c, "help").await.unwrap_err();
    assert!(matches!(err, AgentError::Llm(LlmError::ApiError(_))));
}

#[tokio::test]
async fn test_malformed_completion_degrades_and_continues() {
    let mock = Arc::new(MockLlmClient::with_responses([
        "Sorry, I forgot the format entirely.",
        "END\n---\nLet's start over, how was today?\n---\n",
    ]));
    let c = components(mock.clone(), 5);
    let state = run(&c, "hi").await.unwrap();

    assert_eq!(mock.call_count(), 2);
    assert_eq!(state.messages[1], Message::assistant(""));
    assert_eq!(
        state.last_message(),
        Some(&Message::assistant("Let's start over, how was today?"))
    );
    assert_trace_consistent(&state, 2);
}

#[tokio::test]
async fn test_context_summary_reflects_accumulated_state() {
    let mock = Arc::new(MockLlmClient::with_responses([
        "CONTINUE\n---\nChecking.\n---\n{\"tool\": \"calculate_alcohol\", \"args\": {\"beverage_type\": \"wine\", \"quantity\": 1}}",
        "END\n---\nDone.\n---\n",
    ]));
    let c = components(mock.clone(), 5);
    run(&c, "a glass of wine").await.unwrap();

    let second = mock.last_request().unwrap();
    assert_eq!(second[1].role, Role::System);
    assert!(second[1].content.contains("\"met_goal\": true"));
    assert!(second[1].content.contains("DAILY_CHECKIN"));
}
