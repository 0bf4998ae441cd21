//! 会话记忆：追加式轮次日志
//!
//! 每轮记录序号、说话方、原文与可选结构化载荷（画像增量或推荐集引用）。
//! 日志只追加，当前画像快照单独存于 Session。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::ProfileDelta;
use crate::recommend::RecommendationSet;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 发给 LLM 的单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
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

/// 轮次上的结构化载荷
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPayload {
    /// 本轮抽取 / 反馈产生的画像增量
    ProfileUpdate(ProfileDelta),
    /// 本轮（重新）合成的推荐集快照
    Recommendation(RecommendationSet),
}

/// 单个对话轮
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub seq: u64,
    pub speaker: Role,
    pub text: String,
    pub payload: Option<TurnPayload>,
    pub at: DateTime<Utc>,
}

/// 追加式轮次日志
#[derive(Clone, Debug, Default)]
pub struct TurnLog {
    turns: Vec<ConversationTurn>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一轮，返回其序号
    pub fn append(&mut self, speaker: Role, text: impl Into<String>, payload: Option<TurnPayload>) -> u64 {
        let seq = self.turns.len() as u64;
        self.turns.push(ConversationTurn {
            seq,
            speaker,
            text: text.into(),
            payload,
            at: Utc::now(),
        });
        seq
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
