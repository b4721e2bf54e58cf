//! 应对策略工具（suggest_coping）
//!
//! 每个触发类别对应一个生成器，外加一个通用默认生成器。选择规则是表驱动的全函数：
//! 当前 trigger_type 精确匹配则用对应生成器，unknown 或未设置一律走默认生成器。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{AgentError, CopingAdvice, CopingCategory, ToolOutput, TriggerType};
use crate::llm::{complete_with_system, LlmClient};
use crate::tools::{Tool, ToolContext};

const STRESS_PROMPT: &str = "You are a warm, non-judgmental coach helping someone who drinks to cope with stress. \
Suggest two or three concrete, low-effort ways to release tension right now instead of drinking \
(for example breathing exercises, a short walk, writing down what is weighing on them). \
Keep it brief, encouraging and free of medical advice.";

const SOCIAL_PRESSURE_PROMPT: &str = "You are a warm, non-judgmental coach helping someone who feels pressured to drink in social settings. \
Offer practical ways to stay in control: friendly ways to say no, alcohol-free drinks to order, \
having an exit plan or an ally at the event. Keep it brief, encouraging and free of medical advice.";

const BOREDOM_PROMPT: &str = "You are a warm, non-judgmental coach helping someone who reaches for a drink out of boredom. \
Suggest a few engaging alternatives that fit the moment (a hobby, calling a friend, moving their body, \
a small project). Keep it brief, encouraging and free of medical advice.";

const GENERAL_PROMPT: &str = "You are a warm, non-judgmental coach supporting someone who wants to drink less. \
Offer a few general coping strategies for getting through a craving, remind them why they started, \
and celebrate any progress they mention. Keep it brief, encouraging and free of medical advice.";

/// 单个应对策略生成器：一条类别专属的 system 指令 + 一次 LLM 调用
pub struct CopingGenerator {
    category: CopingCategory,
    system_prompt: String,
}

impl CopingGenerator {
    pub fn new(category: CopingCategory, system_prompt: impl Into<String>) -> Self {
        Self {
            category,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn category(&self) -> CopingCategory {
        self.category
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 生成应对建议，原样返回补全文本
    pub async fn generate(
        &self,
        llm: &dyn LlmClient,
        messages: &[crate::memory::Message],
    ) -> Result<CopingAdvice, AgentError> {
        let response = complete_with_system(llm, &self.system_prompt, messages).await?;
        Ok(CopingAdvice {
            category: self.category,
            response,
        })
    }
}

/// 触发类别 -> 生成器 的完整映射（含默认分支）
pub struct CopingStrategies {
    pub stress: CopingGenerator,
    pub social_pressure: CopingGenerator,
    pub boredom: CopingGenerator,
    pub general: CopingGenerator,
}

impl Default for CopingStrategies {
    fn default() -> Self {
        Self {
            stress: CopingGenerator::new(CopingCategory::Stress, STRESS_PROMPT),
            social_pressure: CopingGenerator::new(CopingCategory::SocialPressure, SOCIAL_PRESSURE_PROMPT),
            boredom: CopingGenerator::new(CopingCategory::Boredom, BOREDOM_PROMPT),
            general: CopingGenerator::new(CopingCategory::General, GENERAL_PROMPT),
        }
    }
}

impl CopingStrategies {
    /// 选择生成器；对所有输入都有定义
    pub fn select(&self, trigger: Option<TriggerType>) -> &CopingGenerator {
        match trigger {
            Some(TriggerType::Stress) => &self.stress,
            Some(TriggerType::SocialPressure) => &self.social_pressure,
            Some(TriggerType::Boredom) => &self.boredom,
            Some(TriggerType::Unknown) | None => &self.general,
        }
    }

    /// 按任意字符串选择（先宽松解析为 TriggerType）
    pub fn select_by_name(&self, trigger: &str) -> &CopingGenerator {
        self.select(Some(TriggerType::parse_lenient(trigger)))
    }
}

/// 应对策略工具
pub struct CopingTool {
    llm: Arc<dyn LlmClient>,
    strategies: CopingStrategies,
}

impl CopingTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            strategies: CopingStrategies::default(),
        }
    }
}

#[async_trait]
impl Tool for CopingTool {
    fn name(&self) -> &str {
        "suggest_coping"
    }

    fn description(&self) -> &str {
        "Generate coping strategies tailored to the identified drinking trigger (run identify_trigger first when the trigger is not known yet). Args: {}"
    }

    async fn execute(&self, _args: Value, ctx: ToolContext<'_>) -> Result<ToolOutput, AgentError> {
        let generator = self.strategies.select(ctx.trigger_type);
        tracing::debug!(
            trigger = ctx.trigger_type.map(|t| t.as_str()).unwrap_or("unset"),
            category = ?generator.category(),
            "coping generator selected"
        );
        let advice = generator.generate(self.llm.as_ref(), ctx.messages).await?;
        Ok(ToolOutput::CopingResponse(advice))
    }
}
