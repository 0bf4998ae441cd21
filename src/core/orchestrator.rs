//! 对话编排器：每轮的状态机驱动
//!
//! 负责：会话取出/放回、过期判定、按状态分派到抽取 / 反馈处理、
//! 跨类目并发检索（join 后才进入合成）、回复生成与轮次记录。
//! 同一会话内组件严格顺序执行；不同类目的检索只读且相互独立，可并发。

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::catalog::Category;
use crate::core::{DialogueState, EngineError, RetryPolicy, Session, SessionManager, TurnOutput};
use crate::llm::LlmClient;
use crate::memory::{build_context, Message, Role, TurnPayload};
use crate::profile::MissingField;
use crate::recommend::{
    Composer, FeedbackHandler, RecommendationSet, RequirementExtractor, RetrievalEngine,
};

const RESPONSE_SYSTEM_PROMPT: &str = r#"You are an interior design shopping assistant.
You help the user pick products for one room at a time within their stated budget.
Present each recommended item with its name, category and price (plus link when available).
Give a total only when a full set is composed. If the set runs over budget or a category
is unavailable, say so plainly. Never re-offer an item the user has declined, and only
answer questions about interior design and product selection."#;

/// 编排器运行参数（来自会话配置）
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// 每类目抓取的候选数
    pub max_top_k: usize,
    /// 连续歧义/无法归类的追问上限，超过则 Aborted
    pub max_feedback_retries: u32,
    /// 回复生成的上下文 token 预算
    pub context_budget_tokens: usize,
    /// 回复生成 LLM 调用的重试策略
    pub llm_retry: RetryPolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_top_k: 5,
            max_feedback_retries: 3,
            context_budget_tokens: 2048,
            llm_retry: RetryPolicy::default(),
        }
    }
}

/// 对话编排器
pub struct Orchestrator {
    extractor: RequirementExtractor,
    retrieval: RetrievalEngine,
    composer: Composer,
    feedback: FeedbackHandler,
    llm: Arc<dyn LlmClient>,
    sessions: Arc<SessionManager>,
    opts: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        extractor: RequirementExtractor,
        retrieval: RetrievalEngine,
        composer: Composer,
        feedback: FeedbackHandler,
        llm: Arc<dyn LlmClient>,
        sessions: Arc<SessionManager>,
        opts: OrchestratorOptions,
    ) -> Self {
        Self {
            extractor,
            retrieval,
            composer,
            feedback,
            llm,
            sessions,
            opts,
        }
    }

    /// 开启新会话
    pub async fn start_session(&self) -> String {
        self.sessions.create().await
    }

    /// 处理一个用户轮：对话轮接口（UI 层消费）
    pub async fn handle_turn(
        &self,
        session_id: &str,
        user_text: &str,
    ) -> Result<TurnOutput, EngineError> {
        let mut session = self
            .sessions
            .take(session_id)
            .await
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let timeout = self.sessions.timeout();
        if session.is_expired(timeout) {
            session.abort();
            self.sessions.put(session).await;
            return Err(EngineError::SessionExpired);
        }

        if session.state.is_terminal() {
            let text = match session.state {
                DialogueState::Done => {
                    "This session is already complete. Please start a new session to continue."
                }
                _ => "This session was aborted. Please start a new session to continue.",
            };
            let output = TurnOutput {
                assistant_text: text.to_string(),
                recommendation: None,
                state: session.state,
            };
            self.sessions.put(session).await;
            return Ok(output);
        }

        // 会话级超时覆盖整轮，含全部在途外部调用
        let remaining = timeout.saturating_sub(session.last_active.elapsed());
        let cancel = session.cancel_token.clone();
        let result = tokio::select! {
            biased;
            res = self.process_turn(&mut session, user_text) => res,
            _ = cancel.cancelled() => Err(EngineError::SessionExpired),
            _ = tokio::time::sleep(remaining) => Err(EngineError::SessionExpired),
        };

        let output = match result {
            Ok(output) => {
                session.touch();
                Ok(output)
            }
            Err(EngineError::SessionExpired) => {
                session.abort();
                Err(EngineError::SessionExpired)
            }
            Err(EngineError::ExternalServiceTimeout) | Err(EngineError::Llm(_)) => {
                // 外部服务故障只结束本轮，会话保持存活
                let text = "I'm sorry, I'm having trouble reaching my product services right now. \
                            Please try again in a moment.";
                session.turns.append(Role::Assistant, text, None);
                session.touch();
                Ok(TurnOutput {
                    assistant_text: text.to_string(),
                    recommendation: None,
                    state: session.state,
                })
            }
            Err(e) => Err(e),
        };

        self.sessions.put(session).await;
        output
    }

    async fn process_turn(
        &self,
        session: &mut Session,
        user_text: &str,
    ) -> Result<TurnOutput, EngineError> {
        session.turns.append(Role::User, user_text, None);

        match session.state {
            DialogueState::AwaitingFeedback => self.refine(session, user_text).await,
            _ => self.elicit(session, user_text).await,
        }
    }

    /// Eliciting：抽取需求，门槛满足后进入检索
    async fn elicit(&self, session: &mut Session, user_text: &str) -> Result<TurnOutput, EngineError> {
        match self.extractor.extract(&session.profile, user_text).await {
            Ok((delta, confidence)) => {
                tracing::debug!("extracted delta with confidence {:.2}", confidence);
                session.clarify_retries = 0;
                session.profile.apply(&delta);

                if session.profile.ready_for_retrieval() {
                    let categories = self.mandatory_categories(session);
                    self.retrieve_and_present(session, &categories).await
                } else {
                    let question = follow_up_question(session.profile.missing_field());
                    session.state = DialogueState::Eliciting;
                    session.turns.append(
                        Role::Assistant,
                        question,
                        Some(TurnPayload::ProfileUpdate(delta)),
                    );
                    Ok(TurnOutput {
                        assistant_text: question.to_string(),
                        recommendation: None,
                        state: session.state,
                    })
                }
            }
            Err(EngineError::ExtractionAmbiguous) => self.clarify(
                session,
                "I didn't quite catch that. Could you tell me which room you're furnishing \
                 and roughly what you're looking for?",
            ),
            Err(e) => Err(e),
        }
    }

    /// AwaitingFeedback → Refining：解释反馈并回流检索/合成
    async fn refine(&self, session: &mut Session, user_text: &str) -> Result<TurnOutput, EngineError> {
        let set = session.recommendation.clone().unwrap_or_default();
        match self.feedback.apply_feedback(&session.profile, &set, user_text).await {
            Ok(outcome) => {
                session.clarify_retries = 0;
                session.state = DialogueState::Refining;

                if outcome.accept {
                    session.state = DialogueState::Done;
                    let text = "Wonderful! Enjoy your new setup — come back any time \
                                you want to furnish another room.";
                    session.turns.append(Role::Assistant, text, None);
                    return Ok(TurnOutput {
                        assistant_text: text.to_string(),
                        recommendation: session.recommendation.clone(),
                        state: session.state,
                    });
                }

                session.profile.apply(&outcome.delta);
                session.exclusions.extend(outcome.exclude_ids.iter().cloned());
                if outcome.invalidates_candidates {
                    session.candidates.clear();
                    session.recommendation = None;
                }

                // 只重检受影响且仍为必选的类目；缓存缺失的必选类目一并补上
                let mandatory = self.mandatory_categories(session);
                let to_fetch: Vec<Category> = mandatory
                    .iter()
                    .filter(|&c| outcome.affected.contains(c) || !session.candidates.contains_key(c))
                    .copied()
                    .collect();

                self.retrieve_and_present(session, &to_fetch).await
            }
            Err(EngineError::FeedbackUnclassifiable) => self.clarify(
                session,
                "I'm not sure what you'd like me to change. You can accept the set, \
                 reject a specific item, adjust the budget, change the style, or pick another room.",
            ),
            Err(e) => Err(e),
        }
    }

    /// 检索给定类目（并发）、合成并呈现
    async fn retrieve_and_present(
        &self,
        session: &mut Session,
        categories: &[Category],
    ) -> Result<TurnOutput, EngineError> {
        session.state = DialogueState::Retrieving;
        let profile = session.profile.clone();
        let exclusions: HashSet<String> = session.exclusions.clone();
        let top_k = self.opts.max_top_k;

        let lookups = categories.iter().map(|category| {
            let profile = &profile;
            let exclusions = &exclusions;
            async move {
                let result = self
                    .retrieval
                    .retrieve(profile, *category, exclusions, top_k)
                    .await;
                (*category, result)
            }
        });

        let mut timeouts = 0usize;
        for (category, result) in join_all(lookups).await {
            match result {
                Ok(candidates) => {
                    session.candidates.insert(category, candidates);
                }
                Err(EngineError::RetrievalUnavailable(_)) => {
                    tracing::warn!("category {} unavailable, degrading", category);
                    session.candidates.remove(&category);
                }
                Err(EngineError::ExternalServiceTimeout) => {
                    tracing::warn!("retrieval for {} timed out, degrading", category);
                    timeouts += 1;
                    session.candidates.remove(&category);
                }
                Err(e) => {
                    tracing::warn!("retrieval for {} failed: {}, degrading", category, e);
                    session.candidates.remove(&category);
                }
            }
        }

        // 所有类目都超时说明外部服务整体不可用，优雅结束本轮
        if !categories.is_empty() && timeouts == categories.len() {
            return Err(EngineError::ExternalServiceTimeout);
        }

        session.state = DialogueState::Composing;
        let set = self.composer.compose(&session.profile, &session.candidates);

        session.state = DialogueState::Presenting;
        let text = self.present(session, &set).await;

        session.recommendation = Some(set.clone());
        session.turns.append(
            Role::Assistant,
            text.clone(),
            Some(TurnPayload::Recommendation(set.clone())),
        );

        session.state = DialogueState::AwaitingFeedback;
        Ok(TurnOutput {
            assistant_text: text,
            recommendation: Some(set),
            state: session.state,
        })
    }

    /// 生成呈现文本：优先 LLM，失败时回退到确定性渲染
    async fn present(&self, session: &Session, set: &RecommendationSet) -> String {
        let rendered = render_set(set);
        let mut messages = build_context(
            RESPONSE_SYSTEM_PROMPT,
            &session.profile.summary(),
            session.turns.turns(),
            self.opts.context_budget_tokens,
        );
        messages.push(Message::user(format!(
            "Present this recommendation set to the user in a friendly, concise way. \
             Keep every fact (names, prices, totals, flags) exactly as given:\n{}",
            rendered
        )));

        let result = self
            .opts
            .llm_retry
            .run("response generation", || async {
                self.llm.complete(&messages).await
            })
            .await;
        match result {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => rendered,
            Err(e) => {
                tracing::warn!(
                    "response generation failed ({:?}), using fallback rendering",
                    e
                );
                rendered
            }
        }
    }

    /// 追问（受 max_feedback_retries 限制，超限 Aborted）
    fn clarify(&self, session: &mut Session, question: &str) -> Result<TurnOutput, EngineError> {
        session.clarify_retries += 1;
        if session.clarify_retries > self.opts.max_feedback_retries {
            let text = "I'm sorry — I couldn't work out what you need after several tries. \
                        Please start a new session and we'll begin fresh.";
            session.abort();
            session.turns.append(Role::Assistant, text, None);
            return Ok(TurnOutput {
                assistant_text: text.to_string(),
                recommendation: None,
                state: session.state,
            });
        }
        session.turns.append(Role::Assistant, question, None);
        Ok(TurnOutput {
            assistant_text: question.to_string(),
            recommendation: None,
            state: session.state,
        })
    }

    fn mandatory_categories(&self, session: &Session) -> Vec<Category> {
        session
            .profile
            .room
            .map(|r| r.mandatory_categories().to_vec())
            .unwrap_or_default()
    }
}

/// 按缺失字段优先级给出针对性追问（room > budget > style）
fn follow_up_question(missing: Option<MissingField>) -> &'static str {
    match missing {
        Some(MissingField::Room) => {
            "Which room are we furnishing — living room, kitchen, bedroom, or bathroom?"
        }
        Some(MissingField::Budget) => "Got it. What total budget should I stay within?",
        Some(MissingField::Style) | None => {
            "Any style preference — minimalist, scandinavian, industrial?"
        }
    }
}

/// 推荐集的确定性渲染（LLM 不可用时直接展示）
pub fn render_set(set: &RecommendationSet) -> String {
    if set.is_empty() {
        let mut text = String::from(
            "I couldn't find suitable products right now.",
        );
        if !set.unavailable.is_empty() {
            let names: Vec<String> = set.unavailable.iter().map(|c| c.to_string()).collect();
            text.push_str(&format!(" Temporarily unavailable: {}.", names.join(", ")));
        }
        return text;
    }

    let mut lines = vec!["Here is what I put together:".to_string()];
    for item in &set.items {
        let mut line = format!(
            "- {} ({}) — {:.0}",
            item.card.name,
            item.category.as_str().replace('_', " "),
            item.card.price
        );
        if let Some(url) = &item.card.url {
            line.push_str(&format!(" — {}", url));
        }
        lines.push(line);
    }

    if set.unavailable.is_empty() {
        lines.push(format!("Total: {:.0}", set.total_cost));
    } else {
        let names: Vec<String> = set.unavailable.iter().map(|c| c.to_string()).collect();
        lines.push(format!(
            "Partial total: {:.0} (temporarily unavailable: {})",
            set.total_cost,
            names.join(", ")
        ));
    }

    if set.over_budget {
        let names: Vec<String> = set
            .over_budget_categories
            .iter()
            .map(|c| c.to_string())
            .collect();
        lines.push(format!(
            "Note: this set runs over your budget — no in-budget option exists for: {}.",
            names.join(", ")
        ));
    }

    lines.join("\n")
}
