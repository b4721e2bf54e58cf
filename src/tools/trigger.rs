//! 触发因素识别工具（identify_trigger）
//!
//! 带完整对话历史调用一次 LLM，要求回答 `<类别>` `---` `<简短解释>`；
//! 无法解析或不在封闭枚举内的类别一律记为 unknown。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{AgentError, ToolOutput, TriggerAssessment, TriggerType};
use crate::llm::{complete_with_system, LlmClient};
use crate::tools::{Tool, ToolContext};
use crate::workflow::parser::split_segments;

pub const TRIGGER_SYSTEM_PROMPT: &str = "You analyse a conversation between a person working on their drinking and a supportive coach. \
Name the single most likely trigger behind the urge to drink. Choose exactly one of: stress, social_pressure, boredom, unknown.\n\
Answer in exactly this format and nothing else:\n\
<trigger>\n---\n<one or two sentences explaining what in the conversation points to it>";

/// 解析分类器补全；缺少分隔符时整段作为类别尝试解析，解释为空
pub fn parse_trigger_answer(raw: &str) -> TriggerAssessment {
    let segments = split_segments(raw);
    let category = segments.first().map(String::as_str).unwrap_or("");
    let explanation = segments.get(1).cloned().unwrap_or_default();
    // 只看类别段的第一行，模型偶尔会在同一段补充说明
    let first_line = category.lines().next().unwrap_or("");
    TriggerAssessment {
        trigger_type: TriggerType::parse_lenient(first_line),
        explanation,
    }
}

/// 触发因素识别工具
pub struct TriggerClassifierTool {
    llm: Arc<dyn LlmClient>,
}

impl TriggerClassifierTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Tool for TriggerClassifierTool {
    fn name(&self) -> &str {
        "identify_trigger"
    }

    fn description(&self) -> &str {
        "Classify what is driving the user's urge to drink (stress, social_pressure, boredom or unknown) from the conversation so far. Args: {}"
    }

    async fn execute(&self, _args: Value, ctx: ToolContext<'_>) -> Result<ToolOutput, AgentError> {
        let raw = complete_with_system(self.llm.as_ref(), TRIGGER_SYSTEM_PROMPT, ctx.messages).await?;
        let assessment = parse_trigger_answer(&raw);
        tracing::debug!(trigger = assessment.trigger_type.as_str(), "trigger classified");
        Ok(ToolOutput::TriggerResult(assessment))
    }
}
