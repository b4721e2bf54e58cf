//! LLM 层：补全服务抽象与实现（OpenAI 兼容 / Azure OpenAI / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage, AZURE_API_VERSION};
pub use traits::{complete_with_system, LlmClient, LlmError, RetryConfig, RetryingLlmClient};
