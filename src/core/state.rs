//! 会话状态：贯穿每一步的 ConversationState
//!
//! 每一步按值接收状态、返回新状态；编排器在两步之间持有唯一一份权威副本。
//! tool_output 为瞬态字段，由下一次协调步骤按结果类型合并进永久字段。

use serde::{Deserialize, Serialize};

use crate::memory::Message;
use crate::workflow::parser::ToolCall;
use crate::workflow::trace::DebugTrace;
use crate::workflow::types::Node;

/// 会话类型（运行期间固定，初始化时设定一次）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    DailyCheckin,
    RelapseSupport,
    SuggestionRequest,
    #[default]
    Other,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::DailyCheckin => "DAILY_CHECKIN",
            SessionType::RelapseSupport => "RELAPSE_SUPPORT",
            SessionType::SuggestionRequest => "SUGGESTION_REQUEST",
            SessionType::Other => "OTHER",
        }
    }
}

/// 饮酒触发因素（封闭枚举）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Stress,
    SocialPressure,
    Boredom,
    Unknown,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Stress => "stress",
            TriggerType::SocialPressure => "social_pressure",
            TriggerType::Boredom => "boredom",
            TriggerType::Unknown => "unknown",
        }
    }

    /// 宽松解析：大小写、空格与连字符不敏感；不在枚举内的一律为 Unknown
    pub fn parse_lenient(s: &str) -> Self {
        let normalized: String = s
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        match normalized.as_str() {
            "stress" => TriggerType::Stress,
            "social_pressure" => TriggerType::SocialPressure,
            "boredom" => TriggerType::Boredom,
            _ => TriggerType::Unknown,
        }
    }
}

/// 饮酒量计算结果（一次 calculate_alcohol 调用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeverageLog {
    /// 饮品类型（已转小写）
    pub beverage_type: String,
    pub quantity: f64,
    /// 单位（glass / bottle / can / shot 或调用方给出的其它值）
    pub unit: String,
    /// 酒精度（体积分数）
    pub abv: f64,
    /// 饮品总体积（mL）
    pub total_volume_ml: f64,
    /// 纯酒精量（mL，保留两位小数）
    pub total_pure_alcohol_ml: f64,
    pub daily_goal_ml: f64,
    pub met_goal: bool,
}

/// 触发因素识别结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerAssessment {
    pub trigger_type: TriggerType,
    pub explanation: String,
}

/// 应对策略的类别（与触发因素一一对应，外加通用默认）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopingCategory {
    Stress,
    SocialPressure,
    Boredom,
    General,
}

/// 应对策略生成结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopingAdvice {
    pub category: CopingCategory,
    pub response: String,
}

/// 工具输出的结果类型判别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultKind {
    AlcoholResult,
    TriggerResult,
    CopingResponse,
}

/// 最近一次工具调用的带标签结果；判别值由变体本身决定，与产生它的工具一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ToolOutput {
    AlcoholResult(BeverageLog),
    TriggerResult(TriggerAssessment),
    CopingResponse(CopingAdvice),
}

impl ToolOutput {
    pub fn kind(&self) -> ToolResultKind {
        match self {
            ToolOutput::AlcoholResult(_) => ToolResultKind::AlcoholResult,
            ToolOutput::TriggerResult(_) => ToolResultKind::TriggerResult,
            ToolOutput::CopingResponse(_) => ToolResultKind::CopingResponse,
        }
    }
}

/// 贯穿编排器每一步的会话状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// 对话历史（只追加）
    pub messages: Vec<Message>,
    pub session_id: String,
    pub user_id: String,
    pub session_type: SessionType,
    pub trigger_type: Option<TriggerType>,
    /// 饮酒量计算结果（只追加）
    pub beverage_logs: Vec<BeverageLog>,
    /// None 表示尚未评估
    pub met_goal: Option<bool>,
    pub conversation_ended: bool,
    /// 协调步骤调用次数，只增不减
    pub step_counter: u32,
    /// 状态机的程序计数器
    pub next_step: Node,
    /// 协调步骤解析出、尚待 tool_node 执行的指令
    pub pending_call: Option<ToolCall>,
    pub tool_output: Option<ToolOutput>,
    pub debug_log: DebugTrace,
}

impl ConversationState {
    /// 初始状态：step_counter = 0，从协调步骤开始
    pub fn new(
        messages: Vec<Message>,
        session_id: String,
        user_id: String,
        session_type: SessionType,
    ) -> Self {
        Self {
            messages,
            session_id,
            user_id,
            session_type,
            trigger_type: None,
            beverage_logs: Vec::new(),
            met_goal: None,
            conversation_ended: false,
            step_counter: 0,
            next_step: Node::CoreAgent,
            pending_call: None,
            tool_output: None,
            debug_log: DebugTrace::default(),
        }
    }

    /// 最后一条消息（CLI 展示用）
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// 将上一次工具调用的结果合并进永久字段，返回合并的结果类型
    ///
    /// 按 ToolOutput 的判别值分派，而不是按刚执行过哪一步。
    pub fn merge_tool_output(&mut self) -> Option<ToolResultKind> {
        let output = self.tool_output.take()?;
        let kind = output.kind();
        match output {
            ToolOutput::AlcoholResult(log) => {
                self.met_goal = Some(log.met_goal);
                self.beverage_logs.push(log);
            }
            ToolOutput::TriggerResult(assessment) => {
                self.trigger_type = Some(assessment.trigger_type);
                self.messages.push(Message::system(format!(
                    "Identified drinking trigger: {}. {}",
                    assessment.trigger_type.as_str(),
                    assessment.explanation
                )));
            }
            ToolOutput::CopingResponse(advice) => {
                self.messages.push(Message::assistant(advice.response));
            }
        }
        Some(kind)
    }

    /// 供 LLM 参考的累积上下文摘要（JSON）
    pub fn context_summary(&self) -> String {
        let summary = serde_json::json!({
            "user_id": self.user_id,
            "session_type": self.session_type.as_str(),
            "trigger_type": self.trigger_type.map(|t| t.as_str()),
            "met_goal": self.met_goal,
            "beverage_logs": self.beverage_logs,
            "step": self.step_counter,
        });
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
    }
}
