//! 检索引擎：画像 + 类目 → 排序候选
//!
//! 合成受类目约束的画像描述 → 嵌入 → 带过滤的 top-k 相似查询。
//! 零候选时降级一次（丢弃最早加入的必需属性）再查；仍为零则
//! RetrievalUnavailable。排序：分数降序，同分价格升序（同等相关选便宜）。

use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::{CatalogStore, Category, QueryFilter, ScoredCard};
use crate::core::{EngineError, RetryPolicy};
use crate::llm::EmbeddingProvider;
use crate::profile::RequirementProfile;

/// 检索引擎
pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn CatalogStore>,
    retry: RetryPolicy,
    score_threshold: f32,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn CatalogStore>,
        retry: RetryPolicy,
        score_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            store,
            retry,
            score_threshold,
        }
    }

    /// 检索某类目的排序候选（确定性：相同输入 + 不变向量库 → 相同输出）
    pub async fn retrieve(
        &self,
        profile: &RequirementProfile,
        category: Category,
        exclude_ids: &HashSet<String>,
        top_k: usize,
    ) -> Result<Vec<ScoredCard>, EngineError> {
        let query_text = profile.describe_for(category);
        let vector = self
            .retry
            .run("embed", || async { self.embedder.embed(&query_text).await })
            .await
            .map_err(EngineError::from)?;

        let mut exclude: Vec<String> = exclude_ids.iter().cloned().collect();
        exclude.sort();

        let filter = QueryFilter {
            category: Some(category),
            exclude_ids: exclude,
            required: profile.required.clone(),
        };

        let mut hits = self.query(&vector, &filter, top_k).await?;

        // 降级一次：丢弃最早加入的必需属性后重查
        if hits.is_empty() {
            if let Some((relaxed, dropped)) = RequirementProfile::relax_oldest_required(&filter.required) {
                tracing::info!(
                    "no candidates for {}, relaxing required attribute {}",
                    category,
                    dropped.0
                );
                let relaxed_filter = QueryFilter {
                    required: relaxed,
                    ..filter
                };
                hits = self.query(&vector, &relaxed_filter, top_k).await?;
            }
        }

        if hits.is_empty() {
            return Err(EngineError::RetrievalUnavailable(category));
        }

        let mut candidates = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            match self.store.get_card(&id).await {
                Ok(Some(card)) => candidates.push(ScoredCard { card, score }),
                Ok(None) => tracing::warn!("hit {} has no resolvable card, skipping", id),
                Err(e) => tracing::warn!("card lookup for {} failed: {}", id, e),
            }
        }

        if candidates.is_empty() {
            return Err(EngineError::RetrievalUnavailable(category));
        }

        // 分数降序；同分价格升序；再按 id 保证完全确定
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.card.price.partial_cmp(&b.card.price).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.card.id.cmp(&b.card.id))
        });

        Ok(candidates)
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &QueryFilter,
        top_k: usize,
    ) -> Result<Vec<(String, f32)>, EngineError> {
        self.retry
            .run("vector query", || async {
                self.store
                    .query(vector, filter, top_k, self.score_threshold)
                    .await
            })
            .await
            .map_err(EngineError::from)
    }
}
