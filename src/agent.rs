//! Headless Agent 运行时
//!
//! 供 CLI 或其他前端调用的无界面逻辑：
//! create_agent_components 按配置构建 LLM / 工具 / 引擎 / 存储，
//! process_message 对一条用户输入跑完整个编排并（如已配置）持久化结果。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, ConversationState, SessionType};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, RetryConfig, RetryingLlmClient};
use crate::memory::Message;
use crate::store::{SessionStore, SqliteStore};
use crate::tools::{AlcoholCalculatorTool, CopingTool, ToolExecutor, ToolRegistry, TriggerClassifierTool};
use crate::workflow::{load_persona, Coordinator, RunRequest, ToolNode, WorkflowEngine};

/// 预构建的 Agent 组件，可被多个会话共享
pub struct AgentComponents {
    pub engine: WorkflowEngine,
    pub llm: Arc<dyn LlmClient>,
    /// 未配置 database_path 时为 None，结果不落盘
    pub store: Option<Arc<dyn SessionStore>>,
}

impl AgentComponents {
    /// 累计 token 用量摘要，供 CLI 在会话结束时打印
    pub fn token_usage_summary(&self) -> String {
        let (prompt, completion, total) = self.llm.token_usage();
        format!("prompt={} completion={} total={}", prompt, completion, total)
    }
}

/// 一个对话线程：会话ID在多轮之间复用
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub session_type: SessionType,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            user_id: user_id.into(),
            session_type: SessionType::default(),
        }
    }

    pub fn with_type(mut self, session_type: SessionType) -> Self {
        self.session_type = session_type;
        self
    }

    /// 开始新线程：新的会话ID，用户与类型不变
    pub fn renew(&mut self) {
        self.id = format!("session_{}", uuid::Uuid::new_v4());
    }
}

/// 按配置选择 LLM 后端；所选后端缺少 Key 时退回 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let llm = &cfg.llm;
    let provider = llm.provider.to_lowercase();

    let client: Arc<dyn LlmClient> = match provider.as_str() {
        "azure" => {
            let key = std::env::var("AZURE_API_KEY").ok();
            let endpoint = llm.azure.resolved_endpoint();
            let deployment = llm.azure.resolved_deployment();
            match (key, endpoint, deployment) {
                (Some(key), Some(endpoint), Some(deployment)) => {
                    tracing::info!("Using Azure OpenAI ({})", deployment);
                    Arc::new(
                        OpenAiClient::azure(&endpoint, &deployment, &llm.azure.api_version, &key)
                            .with_temperature(llm.temperature)
                            .with_request_timeout(llm.timeouts.request),
                    )
                }
                _ => {
                    tracing::warn!("Azure key, endpoint or deployment missing, using Mock LLM");
                    Arc::new(MockLlmClient::new())
                }
            }
        }
        "openai" => match std::env::var("OPENAI_API_KEY") {
            Ok(key) => {
                tracing::info!("Using OpenAI LLM ({})", llm.model);
                Arc::new(
                    OpenAiClient::new(llm.base_url.as_deref(), &llm.model, Some(&key))
                        .with_temperature(llm.temperature)
                        .with_request_timeout(llm.timeouts.request),
                )
            }
            Err(_) => {
                tracing::warn!("OPENAI_API_KEY not set, using Mock LLM");
                Arc::new(MockLlmClient::new())
            }
        },
        "mock" => Arc::new(MockLlmClient::new()),
        other => {
            tracing::warn!("Unknown LLM provider {:?}, using Mock LLM", other);
            Arc::new(MockLlmClient::new())
        }
    };

    if llm.retry.max_retries > 0 {
        let retry = RetryConfig {
            max_retries: llm.retry.max_retries,
            initial_backoff: std::time::Duration::from_millis(llm.retry.initial_backoff_ms),
            max_backoff: std::time::Duration::from_millis(llm.retry.max_backoff_ms),
        };
        Arc::new(RetryingLlmClient::new(client, retry))
    } else {
        client
    }
}

/// 注册三类工具：饮酒量计算、触发识别、应对策略
pub fn create_tool_registry(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(AlcoholCalculatorTool::new().with_daily_goal(cfg.workflow.daily_goal_ml));
    tools.register(TriggerClassifierTool::new(llm.clone()));
    tools.register(CopingTool::new(llm));
    tools
}

/// 创建 Agent 组件（LLM 由配置决定）
pub fn create_agent_components(cfg: &AppConfig) -> anyhow::Result<AgentComponents> {
    let llm = create_llm_from_config(cfg);
    create_agent_components_with_llm(cfg, llm)
}

/// 用给定 LLM 创建 Agent 组件（测试或自定义后端）
pub fn create_agent_components_with_llm(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
) -> anyhow::Result<AgentComponents> {
    let tools = create_tool_registry(cfg, llm.clone());
    let persona = load_persona(cfg.workflow.prompts_dir.as_deref());
    let coordinator = Coordinator::new(llm.clone(), &tools, &persona);
    let tool_node = ToolNode::new(ToolExecutor::new(tools, cfg.tools.tool_timeout_secs));
    let engine = WorkflowEngine::new(coordinator, tool_node, cfg.workflow.max_steps)?;

    let store: Option<Arc<dyn SessionStore>> = match &cfg.app.database_path {
        Some(path) => {
            tracing::info!("Persisting sessions to {}", path.display());
            Some(Arc::new(SqliteStore::open(path)?))
        }
        None => None,
    };

    Ok(AgentComponents { engine, llm, store })
}

/// 处理单条用户消息：追加到历史，跑完编排，持久化后返回最终状态
///
/// 持久化失败只记录警告，不影响本轮回复。
pub async fn process_message(
    components: &AgentComponents,
    mut history: Vec<Message>,
    user_input: &str,
    session: &Session,
) -> Result<ConversationState, AgentError> {
    history.push(Message::user(user_input));
    let request = RunRequest::new(history)
        .session_id(session.id.clone())
        .user_id(session.user_id.clone())
        .session_type(session.session_type);

    let state = components.engine.run(request).await?;

    tracing::info!(
        session_id = %state.session_id,
        steps = state.step_counter,
        trigger = state.trigger_type.map(|t| t.as_str()).unwrap_or("unset"),
        met_goal = ?state.met_goal,
        "turn finished"
    );

    if let Some(store) = &components.store {
        if let Err(e) = store.persist_run(&state) {
            tracing::warn!(session_id = %state.session_id, error = %e, "failed to persist run");
        }
    }
    Ok(state)
}
