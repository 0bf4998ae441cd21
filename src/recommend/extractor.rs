//! 需求抽取器：自由文本 → 画像增量
//!
//! 以 LLM 作 NLU 后端，要求严格 JSON 输出；解析失败、空增量或置信度低于
//! 阈值（0.5）时返回 ExtractionAmbiguous，由编排器重新追问而不是沿用旧画像。
//! LLM 调用走有界重试 + 单次超时，耗尽超时映射为 ExternalServiceTimeout。
//! 抽取器无副作用，只返回增量，合并由调用方完成。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::catalog::{Category, RoomType};
use crate::core::{EngineError, RetryPolicy};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::profile::{ProfileDelta, RequirementProfile};

/// 置信度低于此值按歧义处理
pub const CONFIDENCE_CUTOFF: f32 = 0.5;

/// JSON 无 confidence 字段时的默认值：结构良好即视为高置信
const DEFAULT_CONFIDENCE: f32 = 0.9;

const EXTRACT_SYSTEM_PROMPT: &str = r#"You are a requirement extractor for an interior design shopping assistant.
Read the user's message and the current requirement profile, then output ONLY a JSON object (no prose, no code fences) with these fields, all optional:
- "room": one of "living_room", "kitchen", "bedroom", "bathroom", "other"
- "budget": number, the total budget ceiling the user stated
- "budget_raise_explicit": true only if the user explicitly asked to raise the budget
- "style_tags": array of lowercase style words (e.g. ["minimalist"])
- "require": object of attribute requirements, e.g. {"color": "grey"}
- "exclude": array of attribute names the user ruled out
- "multiples": object mapping a category ("sofa", "bed", "table", "counter_decor", "storage", "lighting", "decor") to the number of options the user explicitly asked to see for it, e.g. {"lighting": 3}
- "confidence": number in [0,1], your confidence in this extraction

Only include fields the message actually supports. If the message carries no requirement information, output {}."#;

/// LLM 原始抽取结果（容忍缺字段）
#[derive(Debug, Deserialize)]
struct RawExtraction {
    room: Option<String>,
    budget: Option<f64>,
    #[serde(default)]
    budget_raise_explicit: bool,
    #[serde(default)]
    style_tags: Vec<String>,
    #[serde(default)]
    require: BTreeMap<String, String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    multiples: BTreeMap<String, u32>,
    confidence: Option<f32>,
}

/// 需求抽取器
pub struct RequirementExtractor {
    llm: Arc<dyn LlmClient>,
    retry: RetryPolicy,
    confidence_cutoff: f32,
}

impl RequirementExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, retry: RetryPolicy) -> Self {
        Self {
            llm,
            retry,
            confidence_cutoff: CONFIDENCE_CUTOFF,
        }
    }

    /// 抽取画像增量与置信度；失败语义见模块说明
    pub async fn extract(
        &self,
        profile: &RequirementProfile,
        utterance: &str,
    ) -> Result<(ProfileDelta, f32), EngineError> {
        let messages = vec![
            Message::system(EXTRACT_SYSTEM_PROMPT),
            Message::user(format!(
                "{}\n\nUser message: {}",
                profile.summary(),
                utterance
            )),
        ];

        let response = self
            .retry
            .run("requirement extraction", || async {
                self.llm.complete(&messages).await
            })
            .await
            .map_err(EngineError::from)?;

        let raw = parse_json_object::<RawExtraction>(&response)
            .ok_or(EngineError::ExtractionAmbiguous)?;

        let confidence = raw.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        let delta = to_delta(raw);

        if delta.is_empty() || confidence < self.confidence_cutoff {
            return Err(EngineError::ExtractionAmbiguous);
        }

        Ok((delta, confidence))
    }
}

fn to_delta(raw: RawExtraction) -> ProfileDelta {
    let multiples: Vec<(Category, u32)> = raw
        .multiples
        .iter()
        .filter_map(|(name, count)| Category::parse(name).map(|c| (c, *count)))
        .collect();
    ProfileDelta {
        room: raw.room.as_deref().and_then(RoomType::parse),
        budget: raw.budget,
        budget_raise_explicit: raw.budget_raise_explicit,
        style_tags: raw.style_tags,
        require: raw.require.into_iter().collect(),
        exclude: raw.exclude,
        multiples,
    }
}

/// 从 LLM 回复中取第一个 JSON 对象并解析（容忍 code fence 与前后缀文本）
pub(crate) fn parse_json_object<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
