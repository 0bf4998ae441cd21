//! 向量库查询抽象与内存实现
//!
//! CatalogStore 只暴露两个操作：相似度查询（返回 id + 分数）与卡片解析。
//! InMemoryStore 用余弦相似度实现同一语义，供测试与无外部依赖的本地运行使用。

use async_trait::async_trait;

use crate::catalog::{Category, ProductCard};

/// 查询过滤器：限定类目、排除已拒绝的商品、必需属性精确匹配
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub category: Option<Category>,
    pub exclude_ids: Vec<String>,
    /// 必需属性（降级时由检索引擎丢弃其中最早加入的一项）
    pub required: Vec<(String, String)>,
}

/// 向量库查询服务
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// 相似度查询：返回 (itemId, score)，按分数降序；低于 score_threshold 的命中被过滤
    async fn query(
        &self,
        vector: &[f32],
        filter: &QueryFilter,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<(String, f32)>, String>;

    /// 按 id 解析商品卡片
    async fn get_card(&self, id: &str) -> Result<Option<ProductCard>, String>;
}

/// 内存向量库：(卡片, 嵌入) 列表上的余弦相似度查询
#[derive(Default)]
pub struct InMemoryStore {
    entries: Vec<(ProductCard, Vec<f32>)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, card: ProductCard, embedding: Vec<f32>) {
        self.entries.push((card, embedding));
    }

    fn matches(card: &ProductCard, filter: &QueryFilter) -> bool {
        if let Some(category) = filter.category {
            if card.category != category {
                return false;
            }
        }
        if filter.exclude_ids.iter().any(|id| id == &card.id) {
            return false;
        }
        filter
            .required
            .iter()
            .all(|(k, v)| card.attributes.get(k).map(|x| x == v).unwrap_or(false))
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn query(
        &self,
        vector: &[f32],
        filter: &QueryFilter,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<(String, f32)>, String> {
        let mut scored: Vec<(String, f32)> = self
            .entries
            .iter()
            .filter(|(card, _)| Self::matches(card, filter))
            .map(|(card, emb)| (card.id.clone(), cosine_similarity(vector, emb)))
            .filter(|(_, score)| *score >= score_threshold)
            .collect();

        // 分数降序，同分按 id 升序，保证确定性
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn get_card(&self, id: &str) -> Result<Option<ProductCard>, String> {
        Ok(self
            .entries
            .iter()
            .find(|(card, _)| card.id == id)
            .map(|(card, _)| card.clone()))
    }
}

/// 余弦相似度
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 构造演示目录：少量带属性与价格的样例商品（无外部向量库时本地运行用）
pub fn demo_catalog() -> Vec<ProductCard> {
    vec![
        ProductCard::new("sofa-01", "Nordica three-seat sofa", Category::Sofa, 450.0)
            .with_attribute("color", "grey")
            .with_attribute("material", "fabric")
            .with_description("Minimalist three-seat sofa in light grey fabric"),
        ProductCard::new("sofa-02", "Loft leather sofa", Category::Sofa, 780.0)
            .with_attribute("color", "brown")
            .with_attribute("material", "leather")
            .with_description("Industrial loft sofa in brown leather"),
        ProductCard::new("table-01", "Oak coffee table", Category::Table, 180.0)
            .with_attribute("material", "oak")
            .with_description("Solid oak coffee table, 120x80 cm"),
        ProductCard::new("lamp-01", "Arc floor lamp", Category::Lighting, 95.0)
            .with_attribute("color", "black")
            .with_description("Arc floor lamp with dimmer"),
        ProductCard::new("lamp-02", "Paper pendant lamp", Category::Lighting, 40.0)
            .with_attribute("color", "white")
            .with_description("Japandi paper pendant lamp"),
        ProductCard::new("storage-01", "Wall cabinet", Category::Storage, 210.0)
            .with_attribute("material", "pine")
            .with_description("Wall-mounted cabinet with two doors"),
        ProductCard::new("counter-01", "Ceramic vase set", Category::CounterDecor, 60.0)
            .with_description("Set of three ceramic vases for the counter"),
        ProductCard::new("decor-01", "Wool area rug", Category::Decor, 130.0)
            .with_attribute("color", "beige")
            .with_description("Hand-woven wool rug, 160x230 cm"),
    ]
}
