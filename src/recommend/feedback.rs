//! 反馈处理器：把用户对推荐集的反应转成画像增量与排除项
//!
//! 先走快速规则匹配（不调 LLM），未命中再用 LLM 做单标签分类，
//! 分类调用走有界重试 + 单次超时，耗尽超时映射为 ExternalServiceTimeout。
//! 被拒绝的商品 id 进入会话级排除集，本会话内不再出现。
//! 两条路都归不了类时返回 FeedbackUnclassifiable，由编排器澄清。

use std::sync::Arc;

use regex::Regex;

use crate::catalog::{Category, RoomType};
use crate::core::{EngineError, RetryPolicy};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::profile::{ProfileDelta, RequirementProfile};
use crate::recommend::RecommendationSet;

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are a feedback classifier for an interior design shopping assistant.
The user has just seen a set of recommended products and replied. Classify the reply.

Output ONLY one of these labels (no explanation):
- accept_all: the user is happy with the whole set
- reject_item: the user dislikes one or more of the shown items
- budget_adjust: the user changed the total budget
- style_adjust: the user wants a different style
- room_change: the user switched to furnishing a different room
- unclear: none of the above fits"#;

/// 归类后的反馈
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    AcceptAll,
    /// 被拒绝的类目（按类目或名称点名的商品解析到类目）
    RejectItems(Vec<Category>),
    BudgetAdjust(f64),
    StyleAdjust(Vec<String>),
    RoomChange(RoomType),
}

/// 反馈应用结果：增量 + 要排除的商品 + 需要重检索的类目
#[derive(Debug, Clone, Default)]
pub struct FeedbackOutcome {
    pub delta: ProfileDelta,
    pub exclude_ids: Vec<String>,
    /// 需要重新检索的类目；空 = 只需用现有候选重新合成（如纯预算调整）
    pub affected: Vec<Category>,
    pub accept: bool,
    /// 房间切换时候选全部失效
    pub invalidates_candidates: bool,
}

/// 反馈处理器
pub struct FeedbackHandler {
    llm: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    /// 启用快速规则匹配（不调用 LLM）
    enable_fast_match: bool,
    amount_re: Regex,
}

impl FeedbackHandler {
    pub fn new(llm: Arc<dyn LlmClient>, retry: RetryPolicy) -> Self {
        Self {
            llm,
            retry,
            enable_fast_match: true,
            amount_re: Regex::new(r"(\d[\d\s,]*(?:\.\d+)?)").expect("valid amount regex"),
        }
    }

    /// 解释反馈并产出增量；不修改画像与推荐集本身
    pub async fn apply_feedback(
        &self,
        profile: &RequirementProfile,
        set: &RecommendationSet,
        utterance: &str,
    ) -> Result<FeedbackOutcome, EngineError> {
        let feedback = match self.fast_match(set, utterance) {
            Some(f) => f,
            None => self.llm_classify(set, utterance).await?,
        };
        Ok(self.to_outcome(profile, set, feedback))
    }

    /// 快速规则匹配（不调用 LLM）
    fn fast_match(&self, set: &RecommendationSet, input: &str) -> Option<Feedback> {
        if !self.enable_fast_match {
            return None;
        }
        let lower = input.to_lowercase();

        if ["accept", "perfect", "looks good", "love it", "i'll take", "take them all", "great, thanks"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            return Some(Feedback::AcceptAll);
        }

        if ["budget", "spend", "afford", "cheaper overall", "up to"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            if let Some(amount) = self.parse_amount(&lower) {
                return Some(Feedback::BudgetAdjust(amount));
            }
        }

        if ["don't like", "dont like", "reject", "not a fan of", "replace", "swap", "something else for", "remove"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            let categories = mentioned_categories(set, &lower);
            if !categories.is_empty() {
                return Some(Feedback::RejectItems(categories));
            }
        }

        if lower.contains("instead") || lower.contains("actually") || lower.contains("switch to") {
            for room in [
                RoomType::LivingRoom,
                RoomType::Kitchen,
                RoomType::Bedroom,
                RoomType::Bathroom,
            ] {
                if lower.contains(&room.as_str().replace('_', " ")) {
                    return Some(Feedback::RoomChange(room));
                }
            }
        }

        if lower.contains("style") {
            let tags = style_words(&lower);
            if !tags.is_empty() {
                return Some(Feedback::StyleAdjust(tags));
            }
        }

        None
    }

    /// 使用 LLM 做单标签分类，再做二次解析
    async fn llm_classify(&self, set: &RecommendationSet, input: &str) -> Result<Feedback, EngineError> {
        let shown: Vec<String> = set
            .items
            .iter()
            .map(|i| format!("{} ({})", i.card.name, i.category))
            .collect();
        let messages = vec![
            Message::system(CLASSIFY_SYSTEM_PROMPT),
            Message::user(format!(
                "Shown items: {}\nUser reply: {}",
                shown.join("; "),
                input
            )),
        ];

        let label = self
            .retry
            .run("feedback classification", || async {
                self.llm.complete(&messages).await
            })
            .await
            .map_err(EngineError::from)?
            .trim()
            .to_lowercase();
        let lower = input.to_lowercase();

        match label.as_str() {
            "accept_all" => Ok(Feedback::AcceptAll),
            "reject_item" => {
                let categories = mentioned_categories(set, &lower);
                if categories.is_empty() {
                    Err(EngineError::FeedbackUnclassifiable)
                } else {
                    Ok(Feedback::RejectItems(categories))
                }
            }
            "budget_adjust" => self
                .parse_amount(&lower)
                .map(Feedback::BudgetAdjust)
                .ok_or(EngineError::FeedbackUnclassifiable),
            "style_adjust" => {
                let tags = style_words(&lower);
                if tags.is_empty() {
                    Err(EngineError::FeedbackUnclassifiable)
                } else {
                    Ok(Feedback::StyleAdjust(tags))
                }
            }
            "room_change" => RoomType::parse(&label_room(&lower))
                .map(Feedback::RoomChange)
                .ok_or(EngineError::FeedbackUnclassifiable),
            _ => Err(EngineError::FeedbackUnclassifiable),
        }
    }

    fn to_outcome(
        &self,
        profile: &RequirementProfile,
        set: &RecommendationSet,
        feedback: Feedback,
    ) -> FeedbackOutcome {
        match feedback {
            Feedback::AcceptAll => FeedbackOutcome {
                accept: true,
                ..Default::default()
            },
            Feedback::RejectItems(categories) => {
                let exclude_ids: Vec<String> = categories
                    .iter()
                    .filter_map(|c| set.item_for(*c))
                    .map(|i| i.card.id.clone())
                    .collect();
                FeedbackOutcome {
                    exclude_ids,
                    affected: categories,
                    ..Default::default()
                }
            }
            Feedback::BudgetAdjust(amount) => {
                // 用户明说的新预算是显式声明，上调也生效
                let raise = profile
                    .budget_ceiling
                    .map(|current| amount > current)
                    .unwrap_or(false);
                FeedbackOutcome {
                    delta: ProfileDelta {
                        budget: Some(amount),
                        budget_raise_explicit: raise,
                        ..Default::default()
                    },
                    // 候选不变，只需重新合成
                    affected: Vec::new(),
                    ..Default::default()
                }
            }
            Feedback::StyleAdjust(tags) => {
                let affected = profile
                    .room
                    .map(|r| r.mandatory_categories().to_vec())
                    .unwrap_or_default();
                FeedbackOutcome {
                    delta: ProfileDelta {
                        style_tags: tags,
                        ..Default::default()
                    },
                    affected,
                    ..Default::default()
                }
            }
            Feedback::RoomChange(room) => FeedbackOutcome {
                delta: ProfileDelta {
                    room: Some(room),
                    ..Default::default()
                },
                affected: room.mandatory_categories().to_vec(),
                invalidates_candidates: true,
                ..Default::default()
            },
        }
    }

    fn parse_amount(&self, lower: &str) -> Option<f64> {
        let m = self.amount_re.find(lower)?;
        let cleaned: String = m.as_str().chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
        cleaned.parse::<f64>().ok().filter(|v| *v >= 0.0)
    }
}

/// 从用户话语里解析被点名的类目：类目名直呼，或推荐项名称被提及
fn mentioned_categories(set: &RecommendationSet, lower: &str) -> Vec<Category> {
    let mut categories: Vec<Category> = Vec::new();
    for item in &set.items {
        let by_category = lower.contains(&item.category.as_str().replace('_', " "))
            || category_synonyms(item.category).iter().any(|s| lower.contains(s));
        let by_name = lower.contains(&item.card.name.to_lowercase());
        if (by_category || by_name) && !categories.contains(&item.category) {
            categories.push(item.category);
        }
    }
    categories
}

fn category_synonyms(category: Category) -> &'static [&'static str] {
    match category {
        Category::Sofa => &["sofa", "couch"],
        Category::Bed => &["bed"],
        Category::Table => &["table", "desk"],
        Category::CounterDecor => &["counter", "vase"],
        Category::Storage => &["storage", "cabinet", "wardrobe", "shelf"],
        Category::Lighting => &["lighting", "lamp", "light"],
        Category::Decor => &["decor", "rug", "decoration"],
    }
}

/// 常见风格词抽取
fn style_words(lower: &str) -> Vec<String> {
    const KNOWN: &[&str] = &[
        "minimalist",
        "scandinavian",
        "industrial",
        "rustic",
        "modern",
        "japandi",
        "bohemian",
        "classic",
        "country",
        "loft",
    ];
    KNOWN
        .iter()
        .filter(|s| lower.contains(**s))
        .map(|s| s.to_string())
        .collect()
}

fn label_room(lower: &str) -> String {
    for room in ["living room", "kitchen", "bedroom", "bathroom"] {
        if lower.contains(room) {
            return room.to_string();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    use crate::catalog::ProductCard;
    use crate::llm::ScriptedLlm;
    use crate::recommend::RecommendedItem;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            base_backoff: Duration::from_millis(1),
            call_timeout: Duration::from_millis(50),
        }
    }

    fn shown_set() -> RecommendationSet {
        RecommendationSet {
            items: vec![
                RecommendedItem {
                    card: ProductCard::new("sofa-01", "Nordica sofa", Category::Sofa, 450.0),
                    category: Category::Sofa,
                },
                RecommendedItem {
                    card: ProductCard::new("lamp-01", "Arc floor lamp", Category::Lighting, 95.0),
                    category: Category::Lighting,
                },
            ],
            total_cost: 545.0,
            coverage: BTreeSet::from([Category::Sofa, Category::Lighting]),
            ..Default::default()
        }
    }

    fn handler() -> FeedbackHandler {
        FeedbackHandler::new(Arc::new(ScriptedLlm::new()), fast_retry())
    }

    fn profile() -> RequirementProfile {
        RequirementProfile {
            room: Some(RoomType::LivingRoom),
            budget_ceiling: Some(1000.0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_accept_all() {
        let outcome = handler()
            .apply_feedback(&profile(), &shown_set(), "Perfect, I'll take them!")
            .await
            .unwrap();
        assert!(outcome.accept);
        assert!(outcome.exclude_ids.is_empty());
    }

    #[tokio::test]
    async fn test_reject_by_category_excludes_only_that_item() {
        // 场景 B：拒绝灯具 → 只排除该商品、只重检该类目
        let outcome = handler()
            .apply_feedback(&profile(), &shown_set(), "I don't like the lamp")
            .await
            .unwrap();
        assert_eq!(outcome.exclude_ids, vec!["lamp-01".to_string()]);
        assert_eq!(outcome.affected, vec![Category::Lighting]);
        assert!(!outcome.accept);
    }

    #[tokio::test]
    async fn test_reject_by_item_name() {
        let outcome = handler()
            .apply_feedback(&profile(), &shown_set(), "please swap the nordica sofa")
            .await
            .unwrap();
        assert_eq!(outcome.exclude_ids, vec!["sofa-01".to_string()]);
        assert_eq!(outcome.affected, vec![Category::Sofa]);
    }

    #[tokio::test]
    async fn test_budget_lower_needs_no_re_retrieval() {
        let outcome = handler()
            .apply_feedback(&profile(), &shown_set(), "my budget is 600 now")
            .await
            .unwrap();
        assert_eq!(outcome.delta.budget, Some(600.0));
        assert!(!outcome.delta.budget_raise_explicit);
        assert!(outcome.affected.is_empty());
    }

    #[tokio::test]
    async fn test_budget_raise_is_explicit() {
        let outcome = handler()
            .apply_feedback(&profile(), &shown_set(), "let's raise the budget to 2000")
            .await
            .unwrap();
        assert_eq!(outcome.delta.budget, Some(2000.0));
        assert!(outcome.delta.budget_raise_explicit);
    }

    #[tokio::test]
    async fn test_room_change_invalidates_candidates() {
        let outcome = handler()
            .apply_feedback(&profile(), &shown_set(), "actually let's do the bedroom")
            .await
            .unwrap();
        assert_eq!(outcome.delta.room, Some(RoomType::Bedroom));
        assert!(outcome.invalidates_candidates);
        assert_eq!(outcome.affected, RoomType::Bedroom.mandatory_categories().to_vec());
    }

    #[tokio::test]
    async fn test_llm_fallback_label() {
        let llm = ScriptedLlm::with_replies(["style_adjust"]);
        let handler = FeedbackHandler::new(Arc::new(llm), fast_retry());
        let outcome = handler
            .apply_feedback(&profile(), &shown_set(), "hmm, maybe more industrial overall?")
            .await
            .unwrap();
        assert_eq!(outcome.delta.style_tags, vec!["industrial"]);
        assert!(!outcome.affected.is_empty());
    }

    #[tokio::test]
    async fn test_unclear_is_unclassifiable() {
        let llm = ScriptedLlm::with_replies(["unclear"]);
        let handler = FeedbackHandler::new(Arc::new(llm), fast_retry());
        let err = handler
            .apply_feedback(&profile(), &shown_set(), "the weather is nice")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::FeedbackUnclassifiable));
    }
}
