//! 对话状态机与单轮输出
//!
//! 显式有限状态机取代动态图编排：Eliciting → Retrieving → Composing →
//! Presenting → AwaitingFeedback → Refining → Done；任意状态可因不可恢复的
//! 外部失败或会话超时进入终态 Aborted。轮与轮之间只会停留在
//! Eliciting / AwaitingFeedback / Done / Aborted，中间状态仅在单轮内出现。

use serde::Serialize;

use crate::recommend::RecommendationSet;

/// 对话状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    /// 收集需求中（画像未达到 room + budget 最低门槛）
    Eliciting,
    /// 按类目检索候选
    Retrieving,
    /// 合成推荐集
    Composing,
    /// 输出推荐集
    Presenting,
    /// 等待用户反馈
    AwaitingFeedback,
    /// 根据反馈调整画像 / 重检索
    Refining,
    /// 用户全盘接受，会话正常结束
    Done,
    /// 终态：会话超时或重试耗尽
    Aborted,
}

impl DialogueState {
    /// 是否终态（不再接受新轮次）
    pub fn is_terminal(&self) -> bool {
        matches!(self, DialogueState::Done | DialogueState::Aborted)
    }
}

/// 单个对话轮的输出（供 UI 层渲染）
#[derive(Clone, Debug, Serialize)]
pub struct TurnOutput {
    pub assistant_text: String,
    /// 本轮若（重新）合成了推荐集，附带快照
    pub recommendation: Option<RecommendationSet>,
    pub state: DialogueState,
}
