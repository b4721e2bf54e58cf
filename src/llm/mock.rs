//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按入队顺序返回预设的补全或错误；队列为空时回显用户最后一条消息并以 END 结束对话。
//! 同时记录每次收到的消息，便于测试断言上下文内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：脚本化响应 + 请求记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以一组补全文本创建
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for r in responses {
            mock.push_response(r);
        }
        mock
    }

    pub fn push_response(&self, response: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(response.into()));
        }
    }

    pub fn push_error(&self, error: LlmError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error));
        }
    }

    /// 已收到的调用次数
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// 按调用顺序记录的全部请求
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// 最近一次调用收到的完整消息（含 system）
    pub fn last_request(&self) -> Option<Vec<Message>> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }

    fn echo(messages: &[Message]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        format!("END\n---\nEcho from Mock: {}\n---\n", last_user)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(result) => result,
            None => Ok(Self::echo(messages)),
        }
    }
}
