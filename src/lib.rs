//! SipControl - 节制饮酒陪伴助手的多步 Agent 编排后端
//!
//! 模块划分：
//! - **agent**: 无头 Agent 运行时（CLI 及其他前端调用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态与错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Azure / Mock）
//! - **memory**: 对话消息
//! - **observability**: tracing 日志初始化
//! - **store**: 调用方侧持久化（SQLite）与进度计算
//! - **tools**: 工具注册表、执行器与三类工具
//! - **workflow**: 协调步骤 / 工具节点 / 引擎组成的状态机

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod store;
pub mod tools;
pub mod workflow;
