//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Azure OpenAI / Mock）实现 LlmClient：给定按角色标记的消息序列，返回一条文本补全。
//! 默认不重试（失败直接传播）；RetryingLlmClient 为可选包装，按指数退避重试可恢复错误。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("LLM config error: {0}")]
    ConfigError(String),
}

impl LlmError {
    /// 是否值得重试（网络 / 服务端错误与超时）
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::ApiError(_) | LlmError::Timeout(_))
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；messages 已包含 system 指令
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 以 system 指令开头拼接消息后调用 LLM
pub async fn complete_with_system(
    llm: &dyn LlmClient,
    system: &str,
    messages: &[Message],
) -> Result<String, LlmError> {
    let mut full_messages = Vec::with_capacity(messages.len() + 1);
    full_messages.push(Message::system(system.to_string()));
    full_messages.extend_from_slice(messages);
    llm.complete(&full_messages).await
}

/// 重试配置；max_retries = 0 即快速失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(8000),
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待时间（从 0 计），指数增长并封顶
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// 带重试的 LLM 客户端包装
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(messages).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let wait = self.config.backoff_for(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let cfg = RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
        };
        assert_eq!(cfg.backoff_for(0), Duration::from_millis(100));
        assert_eq!(cfg.backoff_for(1), Duration::from_millis(200));
        assert_eq!(cfg.backoff_for(2), Duration::from_millis(300));
        assert_eq!(cfg.backoff_for(10), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error(LlmError::ApiError("503".to_string()));
        mock.push_response("END\n---\nok\n---\n");
        let client = RetryingLlmClient::new(mock.clone(), fast_retry(2));

        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "END\n---\nok\n---\n");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_fast() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error(LlmError::Timeout(60));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry(0));

        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err, LlmError::Timeout(60));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error(LlmError::ConfigError("no key".to_string()));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry(3));

        assert!(client.complete(&[Message::user("hi")]).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_complete_with_system_prepends_instruction() {
        let mock = MockLlmClient::new();
        mock.push_response("x");
        complete_with_system(&mock, "be kind", &[Message::user("hi")])
            .await
            .unwrap();
        let seen = mock.last_request().unwrap();
        assert_eq!(seen[0], Message::system("be kind"));
        assert_eq!(seen[1], Message::user("hi"));
    }
}
