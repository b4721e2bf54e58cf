//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SIPCONTROL__*` 覆盖（双下划线表示嵌套，如 `SIPCONTROL__WORKFLOW__MAX_STEPS=8`）。
//! API Key 不放进配置文件，只从 AZURE_API_KEY / OPENAI_API_KEY 读取。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub workflow: WorkflowSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、SQLite 文件位置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 会话存储的 SQLite 文件；未设置时不持久化
    pub database_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "SipControl".to_string(),
            database_path: None,
        }
    }
}

/// [llm] 段：后端选择、采样温度、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：azure / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 补全服务使用确定性采样
    pub temperature: f32,
    pub azure: LlmAzureSection,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "azure".to_string(),
            model: "gpt-4".to_string(),
            base_url: None,
            temperature: 0.0,
            azure: LlmAzureSection::default(),
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

/// [llm.azure] 段；endpoint / deployment 缺省时回退到 AZURE_ENDPOINT / GPT4_DEPLOYMENT 环境变量
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmAzureSection {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_version: String,
}

impl Default for LlmAzureSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            deployment: None,
            api_version: crate::llm::AZURE_API_VERSION.to_string(),
        }
    }
}

impl LlmAzureSection {
    pub fn resolved_endpoint(&self) -> Option<String> {
        self.endpoint
            .clone()
            .or_else(|| std::env::var("AZURE_ENDPOINT").ok())
    }

    pub fn resolved_deployment(&self) -> Option<String> {
        self.deployment
            .clone()
            .or_else(|| std::env::var("GPT4_DEPLOYMENT").ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次补全请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [llm.retry] 段：默认不重试，失败直接传播给调用方
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

/// [workflow] 段：步数预算、每日目标、提示词目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    pub max_steps: u32,
    /// 每日纯酒精目标（mL）
    pub daily_goal_ml: f64,
    /// 存在 core_agent.txt 时覆盖默认人设
    pub prompts_dir: Option<PathBuf>,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_steps: crate::workflow::DEFAULT_MAX_STEPS,
            daily_goal_ml: crate::tools::DAILY_GOAL_ML,
            prompts_dir: None,
        }
    }
}

/// [tools] 段：工具超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SIPCONTROL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SIPCONTROL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SIPCONTROL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
