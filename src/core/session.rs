//! 会话管理
//!
//! 每会话持有一份记忆（轮次日志）、当前画像、当前推荐集与排除集。
//! 处理一轮时会话被整体取出（checkout），保证单轮内独占修改；
//! 会话间相互独立，可完全并行。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Category, ScoredCard};
use crate::core::DialogueState;
use crate::memory::TurnLog;
use crate::profile::RequirementProfile;
use crate::recommend::RecommendationSet;

/// 会话 ID
pub type SessionId = String;

/// 单个会话
pub struct Session {
    pub id: SessionId,
    /// 追加式轮次日志
    pub turns: TurnLog,
    /// 当前需求画像
    pub profile: RequirementProfile,
    /// 当前推荐集（首次合成前为 None）
    pub recommendation: Option<RecommendationSet>,
    /// 被拒绝商品的排除集（会话级，检索时始终带上）
    pub exclusions: HashSet<String>,
    /// 上次检索的候选缓存（纯预算调整只重合成，不重检索）
    pub candidates: BTreeMap<Category, Vec<ScoredCard>>,
    pub state: DialogueState,
    /// 连续歧义/无法归类的次数，超限则 Aborted
    pub clarify_retries: u32,
    /// 在途外部调用的取消令牌（会话中止时触发）
    pub cancel_token: CancellationToken,
    pub last_active: Instant,
    pub created_at: Instant,
}

impl Session {
    pub fn new() -> Self {
        let id = format!("session_{}", uuid::Uuid::new_v4());
        Self {
            id,
            turns: TurnLog::new(),
            profile: RequirementProfile::default(),
            recommendation: None,
            exclusions: HashSet::new(),
            candidates: BTreeMap::new(),
            state: DialogueState::Eliciting,
            clarify_retries: 0,
            cancel_token: CancellationToken::new(),
            last_active: Instant::now(),
            created_at: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// 会话是否过期
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_active.elapsed() > timeout
    }

    /// 中止：取消在途调用并进入终态
    pub fn abort(&mut self) {
        self.cancel_token.cancel();
        self.state = DialogueState::Aborted;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// 会话管理器：创建、取出/放回、过期清理
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Session>>,
    session_timeout: Duration,
}

impl SessionManager {
    pub fn new(session_timeout_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_timeout: Duration::from_secs(session_timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.session_timeout
    }

    /// 创建新会话，返回其 ID
    pub async fn create(&self) -> SessionId {
        let session = Session::new();
        let id = session.id.clone();
        self.sessions.write().await.insert(id.clone(), session);
        id
    }

    /// 取出会话（独占处理一轮）；轮结束后必须 put 回
    pub async fn take(&self, session_id: &str) -> Option<Session> {
        self.sessions.write().await.remove(session_id)
    }

    /// 放回会话
    pub async fn put(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    /// 只读/轻量访问（不跨 await 持有）
    pub async fn with_session<F, R>(&self, session_id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(session_id).map(f)
    }

    /// 中止会话：取消在途调用并标记终态
    pub async fn abort(&self, session_id: &str) -> bool {
        self.with_session(session_id, |s| s.abort()).await.is_some()
    }

    /// 清理过期会话，返回清理数量
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(self.session_timeout))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            if let Some(mut s) = sessions.remove(id) {
                s.abort();
            }
        }
        expired.len()
    }

    /// 活跃会话数
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(3600)
    }
}
