//! Nest - Rust 室内设计推荐引擎
//!
//! 模块划分：
//! - **catalog**: 商品卡片、类目权重、向量库抽象（Qdrant / 内存）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、对话状态机、会话管理、重试、编排器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话轮次日志与上下文组装
//! - **profile**: 需求画像与增量合并规则
//! - **recommend**: 需求抽取、向量检索、预算合成、反馈解释

pub mod catalog;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod profile;
pub mod recommend;

pub use crate::core::{Orchestrator, OrchestratorOptions};
