//! 对话消息
//!
//! 按角色标记的单条对话；顺序即对话顺序，每一步都会原样重放给 LLM。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致；System 同时用于系统注入的说明，如触发因素解释、步数耗尽致歉）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// 从存储中的字符串还原；未知值按 System 处理
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::System,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_str() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(Role::from_str_lossy(role.as_str()), role);
        }
        assert_eq!(Role::from_str_lossy("tool"), Role::System);
    }

    #[test]
    fn test_message_serializes_snake_case_role() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
