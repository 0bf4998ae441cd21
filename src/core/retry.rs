//! 外部调用的有界重试与指数退避
//!
//! 重试只作用于单次外部调用（嵌入 / 向量查询 / LLM 补全），从不跨会话；
//! 每次尝试都套单独超时，耗尽后根据是否观测到超时区分失败类型。

use std::future::Future;
use std::time::Duration;

/// 单次外部调用的重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最多尝试次数（含首次）
    pub attempts: u32,
    /// 首次退避时长，之后按 2^n 递增
    pub base_backoff: Duration,
    /// 单次尝试的超时
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_backoff: Duration::from_millis(200),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// 重试耗尽后的失败类型
#[derive(Debug)]
pub enum RetryFailure {
    /// 最后一次尝试超时
    Timeout,
    /// 最后一次尝试返回错误
    Failed(String),
}

impl RetryPolicy {
    /// 执行 f 直到成功或尝试耗尽；op 仅用于日志
    pub async fn run<T, F, Fut>(&self, op: &str, f: F) -> Result<T, RetryFailure>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let mut last_failure = RetryFailure::Failed("no attempts configured".into());

        for attempt in 0..self.attempts.max(1) {
            if attempt > 0 {
                let backoff = self.base_backoff * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }

            match tokio::time::timeout(self.call_timeout, f()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    tracing::warn!("{} attempt {} failed: {}", op, attempt + 1, e);
                    last_failure = RetryFailure::Failed(e);
                }
                Err(_) => {
                    tracing::warn!("{} attempt {} timed out", op, attempt + 1);
                    last_failure = RetryFailure::Timeout;
                }
            }
        }

        Err(last_failure)
    }
}
