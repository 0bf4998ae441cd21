//! 引擎错误类型与恢复策略
//!
//! 抽取/反馈分类失败 → 重新追问（受 max_feedback_retries 限制）；
//! 检索失败 → 单类目降级，其余类目继续；外部服务超时 → 本轮优雅结束；
//! 只有会话超时才升级为终态 Aborted。

use thiserror::Error;

use crate::catalog::Category;
use crate::core::RetryFailure;

/// 推荐引擎运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum EngineError {
    /// 外部 NLU 返回畸形或空结构，需要重新追问而不是沿用旧画像
    #[error("Extraction ambiguous")]
    ExtractionAmbiguous,

    /// 向量库不可达，或降级一次后仍无候选
    #[error("Retrieval unavailable for category: {0}")]
    RetrievalUnavailable(Category),

    /// 反馈无法归入任何类别，需要澄清
    #[error("Feedback unclassifiable")]
    FeedbackUnclassifiable,

    /// 外部调用重试耗尽后仍超时
    #[error("External service timeout")]
    ExternalServiceTimeout,

    /// 会话超时，终态，需要新会话
    #[error("Session expired")]
    SessionExpired,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("LLM error: {0}")]
    Llm(String),
}

impl From<RetryFailure> for EngineError {
    fn from(failure: RetryFailure) -> Self {
        match failure {
            RetryFailure::Timeout => EngineError::ExternalServiceTimeout,
            RetryFailure::Failed(e) => EngineError::Llm(e),
        }
    }
}
