//! 会话记忆：追加式轮次日志 + 上下文组装

mod context;
mod turns;

pub use context::{build_context, TokenEstimator};
pub use turns::{ConversationTurn, Message, Role, TurnLog, TurnPayload};
