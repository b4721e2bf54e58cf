//! 结构化补全解析
//!
//! 补全按三段书写：状态（CONTINUE / END）、`---`、用户可见消息、`---`、可选的工具指令 JSON。
//! 解析失败返回带类型的 ParseError；调用方用 ParseError::degrade 得到降级结果，而不是崩溃。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 段落分隔行
pub const SEGMENT_DELIMITER: &str = "---";

/// 协调步骤给出的单条工具指令：{"tool": "calculate_alcohol", "args": {...}}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default = "empty_args")]
    pub args: serde_json::Value,
}

fn empty_args() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// 状态标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Continue,
    End,
}

impl Status {
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let token = token
            .strip_prefix("STATUS:")
            .or_else(|| token.strip_prefix("status:"))
            .or_else(|| token.strip_prefix("Status:"))
            .unwrap_or(token)
            .trim()
            .trim_matches(|c: char| c == '*' || c == '`' || c == '.');
        match token.to_uppercase().as_str() {
            "CONTINUE" => Some(Status::Continue),
            "END" => Some(Status::End),
            _ => None,
        }
    }
}

/// 解析后的补全
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCompletion {
    pub status: Status,
    pub message: String,
    pub directive: Option<ToolCall>,
}

impl ParsedCompletion {
    pub fn is_end(&self) -> bool {
        self.status == Status::End
    }
}

/// 补全格式错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("completion has no '---' delimited segments")]
    MissingDelimiter,
    #[error("unknown status token: {0:?}")]
    UnknownStatus(String),
    #[error("invalid tool directive: {reason}")]
    InvalidDirective {
        status: Status,
        message: String,
        reason: String,
    },
}

impl ParseError {
    /// 降级结果：指令无效时保留状态与消息、丢弃指令；其余情况视为「继续 + 空消息」
    pub fn degrade(self) -> ParsedCompletion {
        match self {
            ParseError::InvalidDirective { status, message, .. } => ParsedCompletion {
                status,
                message,
                directive: None,
            },
            ParseError::MissingDelimiter | ParseError::UnknownStatus(_) => ParsedCompletion {
                status: Status::Continue,
                message: String::new(),
                directive: None,
            },
        }
    }
}

/// 按独占一行的 `---` 切分，最多切三段；第三段之后的分隔行归入最后一段
pub fn split_segments(raw: &str) -> Vec<String> {
    let mut segments: Vec<Vec<&str>> = vec![Vec::new()];
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim() == SEGMENT_DELIMITER && segments.len() < 3 {
            segments.push(Vec::new());
        } else if let Some(current) = segments.last_mut() {
            current.push(line);
        }
    }
    segments
        .into_iter()
        .map(|lines| lines.join("\n").trim().to_string())
        .collect()
}

/// 解析协调步骤的补全
pub fn parse_completion(raw: &str) -> Result<ParsedCompletion, ParseError> {
    let segments = split_segments(raw);
    if segments.len() < 2 {
        return Err(ParseError::MissingDelimiter);
    }

    let status =
        Status::parse(&segments[0]).ok_or_else(|| ParseError::UnknownStatus(segments[0].clone()))?;
    let message = segments[1].clone();
    let directive_text = segments.get(2).map(String::as_str).unwrap_or("");

    match parse_directive(directive_text) {
        Ok(directive) => Ok(ParsedCompletion {
            status,
            message,
            directive,
        }),
        Err(reason) => Err(ParseError::InvalidDirective {
            status,
            message,
            reason,
        }),
    }
}

/// 解析指令段：空 / none / null 为无指令；否则为 JSON（可包在 ```json 代码块中）
fn parse_directive(text: &str) -> Result<Option<ToolCall>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("null")
    {
        return Ok(None);
    }

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        trimmed
    };

    let call: ToolCall =
        serde_json::from_str(json_str).map_err(|e| format!("{}: {}", e, json_str))?;
    if call.tool.trim().is_empty() {
        return Err("tool name is empty".to_string());
    }
    if !call.args.is_object() {
        return Err(format!("args for {} must be an object", call.tool));
    }
    Ok(Some(call))
}
