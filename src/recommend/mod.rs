//! 推荐流水线：需求抽取 → 检索 → 合成 → 反馈

mod composer;
mod extractor;
mod feedback;
mod retrieval;

pub use composer::{Composer, RecommendationSet, RecommendedItem, WeightTable};
pub use extractor::RequirementExtractor;
pub use feedback::{FeedbackHandler, FeedbackOutcome};
pub use retrieval::RetrievalEngine;
