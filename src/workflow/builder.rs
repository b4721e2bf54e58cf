//! 运行请求构建器
//!
//! 提供流畅的 API 组装一次工作流运行的初始输入

use crate::core::{ConversationState, SessionType};
use crate::memory::Message;

/// 一次工作流运行的初始输入
#[derive(Debug, Clone)]
pub struct RunRequest {
    messages: Vec<Message>,
    session_id: Option<String>,
    user_id: String,
    session_type: SessionType,
}

impl RunRequest {
    /// 以完整对话历史创建（最后一条通常是最新的用户输入）
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            session_id: None,
            user_id: "anonymous".to_string(),
            session_type: SessionType::default(),
        }
    }

    /// 设置会话ID（复用同一会话时传入）
    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// 设置用户ID
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// 设置会话类型；运行期间不会改变
    pub fn session_type(mut self, session_type: SessionType) -> Self {
        self.session_type = session_type;
        self
    }

    /// 生成初始状态；未给出会话ID时生成一个新的
    pub fn into_state(self) -> ConversationState {
        let session_id = self
            .session_id
            .unwrap_or_else(|| format!("session_{}", uuid::Uuid::new_v4()));
        ConversationState::new(self.messages, session_id, self.user_id, self.session_type)
    }
}
