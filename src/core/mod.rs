//! 核心：错误类型、对话状态机、会话管理、重试策略与编排器

mod error;
mod orchestrator;
mod retry;
mod session;
mod state;

pub use error::EngineError;
pub use orchestrator::{render_set, Orchestrator, OrchestratorOptions};
pub use retry::{RetryFailure, RetryPolicy};
pub use session::{Session, SessionId, SessionManager};
pub use state::{DialogueState, TurnOutput};
