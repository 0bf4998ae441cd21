//! 上下文组装与 Token 预算
//!
//! 为 LLM 请求组装消息列表：system 提示 + 画像摘要 + 历史轮次。
//! 超出预算时从最旧轮次开始丢弃，画像摘要永不丢弃。

use crate::memory::{ConversationTurn, Message, Role};

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 启发式规则：ASCII 约 4 字符/token，非 ASCII 约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0usize;
        let mut non_ascii_chars = 0usize;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

/// 在 token 预算内组装 LLM 消息列表
///
/// system 段（系统提示 + 画像摘要）总是保留；历史轮次从最新往回填充，
/// 预算耗尽即停，因此被丢弃的总是最旧的轮次。
pub fn build_context(
    system_prompt: &str,
    profile_summary: &str,
    turns: &[ConversationTurn],
    budget_tokens: usize,
) -> Vec<Message> {
    let system = format!("{}\n\n{}", system_prompt, profile_summary);
    let mut remaining = budget_tokens.saturating_sub(TokenEstimator::estimate(&system));

    let mut kept: Vec<Message> = Vec::new();
    for turn in turns.iter().rev() {
        if matches!(turn.speaker, Role::System) {
            continue;
        }
        let cost = TokenEstimator::estimate(&turn.text);
        if cost > remaining {
            break;
        }
        remaining -= cost;
        kept.push(Message {
            role: turn.speaker,
            content: turn.text.clone(),
        });
    }
    kept.reverse();

    let mut messages = Vec::with_capacity(kept.len() + 1);
    messages.push(Message::system(system));
    messages.extend(kept);
    messages
}
