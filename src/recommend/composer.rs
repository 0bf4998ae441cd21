//! 推荐合成器：贪心、按权重排序的约束选品
//!
//! 每个必选类目按权重表获得软子预算（对参与类目归一化），按权重降序填充，
//! 剩余预算顺流到后面的低权重类目。某类目无预算内候选时选最便宜的一件并
//! 标记超预算——超预算只显式呈现，从不静默违反。有意取贪心而非精确最优：
//! 确定、可向用户解释。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::{Category, ProductCard, ScoredCard};
use crate::profile::RequirementProfile;

/// 类目 → 预算权重表（可由配置覆盖单个类目）
#[derive(Debug, Clone)]
pub struct WeightTable {
    weights: BTreeMap<Category, f64>,
}

impl Default for WeightTable {
    fn default() -> Self {
        let weights = Category::all()
            .iter()
            .map(|c| (*c, c.base_weight()))
            .collect();
        Self { weights }
    }
}

impl WeightTable {
    /// 用配置中的 category → share 覆盖默认权重；未知类目名忽略
    pub fn with_overrides(overrides: &BTreeMap<String, f64>) -> Self {
        let mut table = Self::default();
        for (name, share) in overrides {
            if let Some(category) = Category::parse(name) {
                if *share > 0.0 {
                    table.weights.insert(category, *share);
                }
            } else {
                tracing::warn!("unknown category in weight table: {}", name);
            }
        }
        table
    }

    pub fn weight(&self, category: Category) -> f64 {
        self.weights.get(&category).copied().unwrap_or(0.1)
    }
}

/// 推荐集中的单项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedItem {
    pub card: ProductCard,
    pub category: Category,
}

/// 合成出的推荐集；由合成器整体替换，其他组件不就地修改
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationSet {
    /// 按填充顺序（权重降序）排列
    pub items: Vec<RecommendedItem>,
    pub total_cost: f64,
    pub coverage: BTreeSet<Category>,
    /// 总价超出预算上限时为 true，且 over_budget_categories 恰好指出肇因类目
    pub over_budget: bool,
    pub over_budget_categories: Vec<Category>,
    /// 检索不到候选（含降级后）的类目
    pub unavailable: Vec<Category>,
}

impl RecommendationSet {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 按类目取选中项
    pub fn item_for(&self, category: Category) -> Option<&RecommendedItem> {
        self.items.iter().find(|i| i.category == category)
    }
}

/// 推荐合成器
pub struct Composer {
    weights: WeightTable,
}

impl Composer {
    pub fn new(weights: WeightTable) -> Self {
        Self { weights }
    }

    /// 合成推荐集。candidates 里缺失或为空的必选类目进入 unavailable；
    /// 每类目至多选一件，画像 multiples 点名的类目在子预算内最多给出
    /// 所要求数量的不同选项（候选已按相关度排好序）。
    pub fn compose(
        &self,
        profile: &RequirementProfile,
        candidates: &BTreeMap<Category, Vec<ScoredCard>>,
    ) -> RecommendationSet {
        let budget = profile.budget_ceiling.unwrap_or(0.0);
        let mandatory: Vec<Category> = profile
            .room
            .map(|r| r.mandatory_categories().to_vec())
            .unwrap_or_default();

        let mut unavailable: Vec<Category> = Vec::new();
        let mut fillable: Vec<Category> = Vec::new();
        for category in &mandatory {
            match candidates.get(category) {
                Some(list) if !list.is_empty() => fillable.push(*category),
                _ => unavailable.push(*category),
            }
        }

        // 权重对参与填充的类目归一化为预算份额
        let weight_sum: f64 = fillable.iter().map(|c| self.weights.weight(*c)).sum();

        // 填充顺序：权重降序，同权重按类目序，保持确定性
        let mut fill_order = fillable.clone();
        fill_order.sort_by(|a, b| {
            self.weights
                .weight(*b)
                .partial_cmp(&self.weights.weight(*a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(b))
        });

        let mut set = RecommendationSet {
            unavailable,
            ..Default::default()
        };
        let mut carry = 0.0f64;

        for category in fill_order {
            let share = if weight_sum > 0.0 {
                self.weights.weight(category) / weight_sum
            } else {
                0.0
            };
            let sub_budget = budget * share + carry;
            let quantity = profile.multiples.get(&category).copied().unwrap_or(1).max(1) as usize;

            let list = &candidates[&category];
            let mut remaining = sub_budget;
            let mut picked = 0usize;
            for candidate in list {
                if picked == quantity {
                    break;
                }
                if candidate.card.price <= remaining {
                    remaining -= candidate.card.price;
                    set.push(candidate, category);
                    picked += 1;
                }
            }

            if picked > 0 {
                carry = remaining;
            } else {
                // 无预算内候选：取最便宜的一件并显式标记
                let cheapest = list
                    .iter()
                    .min_by(|a, b| {
                        a.card
                            .price
                            .partial_cmp(&b.card.price)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then_with(|| a.card.id.cmp(&b.card.id))
                    })
                    .expect("fillable category has candidates");
                carry = 0.0;
                set.over_budget_categories.push(category);
                set.push(cheapest, category);
            }
        }

        set.over_budget = set.total_cost > budget;
        if !set.over_budget {
            // 总价实际落回预算内时不保留类目标记
            set.over_budget_categories.clear();
        }
        set
    }
}

impl RecommendationSet {
    fn push(&mut self, candidate: &ScoredCard, category: Category) {
        self.total_cost += candidate.card.price;
        self.coverage.insert(category);
        self.items.push(RecommendedItem {
            card: candidate.card.clone(),
            category,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RoomType;

    fn profile(room: RoomType, budget: f64) -> RequirementProfile {
        RequirementProfile {
            room: Some(room),
            budget_ceiling: Some(budget),
            ..Default::default()
        }
    }

    fn scored(id: &str, category: Category, price: f64, score: f32) -> ScoredCard {
        ScoredCard {
            card: ProductCard::new(id, id, category, price),
            score,
        }
    }

    fn composer() -> Composer {
        Composer::new(WeightTable::default())
    }

    #[test]
    fn test_kitchen_within_budget_covers_all_categories() {
        // 场景 A：kitchen / 1000，三个类目都能在子预算内满足
        let mut candidates = BTreeMap::new();
        candidates.insert(
            Category::CounterDecor,
            vec![scored("c1", Category::CounterDecor, 300.0, 0.9)],
        );
        candidates.insert(
            Category::Lighting,
            vec![scored("l1", Category::Lighting, 150.0, 0.9)],
        );
        candidates.insert(
            Category::Storage,
            vec![scored("s1", Category::Storage, 250.0, 0.9)],
        );

        let set = composer().compose(&profile(RoomType::Kitchen, 1000.0), &candidates);
        assert!(!set.over_budget);
        assert!(set.total_cost <= 1000.0);
        assert_eq!(set.coverage.len(), 3);
        assert!(set.coverage.contains(&Category::CounterDecor));
        assert!(set.coverage.contains(&Category::Lighting));
        assert!(set.coverage.contains(&Category::Storage));
    }

    #[test]
    fn test_carry_over_flows_to_later_categories() {
        // 高权重类目用得省，剩余预算让低权重类目买得起超过自身份额的候选
        let mut candidates = BTreeMap::new();
        candidates.insert(Category::Sofa, vec![scored("s", Category::Sofa, 100.0, 0.9)]);
        candidates.insert(Category::Table, vec![scored("t", Category::Table, 400.0, 0.9)]);
        candidates.insert(
            Category::Lighting,
            vec![scored("l", Category::Lighting, 350.0, 0.9)],
        );

        // 权重 sofa .40 / table .25 / lighting .15 → 归一化 .5 / .3125 / .1875
        // sofa 花 100 省 400，table 子预算 312.5+400 > 400，lighting 同理
        let set = composer().compose(&profile(RoomType::LivingRoom, 1000.0), &candidates);
        assert!(!set.over_budget);
        assert_eq!(set.coverage.len(), 3);
        assert_eq!(set.total_cost, 850.0);
    }

    #[test]
    fn test_no_feasible_candidate_flags_exactly_that_category() {
        let mut candidates = BTreeMap::new();
        candidates.insert(Category::Sofa, vec![scored("s", Category::Sofa, 200.0, 0.9)]);
        candidates.insert(Category::Table, vec![scored("t", Category::Table, 100.0, 0.9)]);
        candidates.insert(
            Category::Lighting,
            // 远超预算，只能取最便宜的并标记
            vec![
                scored("l2", Category::Lighting, 5000.0, 0.9),
                scored("l1", Category::Lighting, 2000.0, 0.8),
            ],
        );

        let set = composer().compose(&profile(RoomType::LivingRoom, 500.0), &candidates);
        assert!(set.over_budget);
        assert_eq!(set.over_budget_categories, vec![Category::Lighting]);
        // 超预算时选的是最便宜的候选
        assert_eq!(set.item_for(Category::Lighting).unwrap().card.id, "l1");
        assert_eq!(set.coverage.len(), 3);
    }

    #[test]
    fn test_missing_candidates_marked_unavailable() {
        // 场景 C：storage 无候选 → 缺席且被标记，其余类目不受影响
        let mut candidates = BTreeMap::new();
        candidates.insert(
            Category::CounterDecor,
            vec![scored("c", Category::CounterDecor, 100.0, 0.9)],
        );
        candidates.insert(
            Category::Lighting,
            vec![scored("l", Category::Lighting, 100.0, 0.9)],
        );

        let set = composer().compose(&profile(RoomType::Kitchen, 1000.0), &candidates);
        assert_eq!(set.unavailable, vec![Category::Storage]);
        assert!(!set.coverage.contains(&Category::Storage));
        assert_eq!(set.coverage.len(), 2);
        assert!(!set.over_budget);
    }

    #[test]
    fn test_budget_drop_squeezes_lowest_weight_first() {
        // 场景 D：1000 → 600，低权重类目最先被挤到便宜候选
        let mut candidates = BTreeMap::new();
        candidates.insert(
            Category::Sofa,
            vec![scored("s-good", Category::Sofa, 300.0, 0.9), scored("s-cheap", Category::Sofa, 150.0, 0.5)],
        );
        candidates.insert(
            Category::Table,
            vec![scored("t-good", Category::Table, 180.0, 0.9), scored("t-cheap", Category::Table, 80.0, 0.5)],
        );
        candidates.insert(
            Category::Lighting,
            vec![scored("l-good", Category::Lighting, 130.0, 0.9), scored("l-cheap", Category::Lighting, 40.0, 0.5)],
        );

        let generous = composer().compose(&profile(RoomType::LivingRoom, 1000.0), &candidates);
        assert_eq!(generous.item_for(Category::Lighting).unwrap().card.id, "l-good");

        let tight = composer().compose(&profile(RoomType::LivingRoom, 600.0), &candidates);
        assert!(tight.total_cost <= 600.0);
        // 高权重类目保住首选，灯具被降档
        assert_eq!(tight.item_for(Category::Sofa).unwrap().card.id, "s-good");
        assert_eq!(tight.item_for(Category::Lighting).unwrap().card.id, "l-cheap");
    }

    #[test]
    fn test_multiples_offers_variants_within_sub_budget() {
        let mut candidates = BTreeMap::new();
        candidates.insert(Category::Sofa, vec![scored("s", Category::Sofa, 300.0, 0.9)]);
        candidates.insert(Category::Table, vec![scored("t", Category::Table, 180.0, 0.9)]);
        candidates.insert(
            Category::Lighting,
            vec![
                scored("l1", Category::Lighting, 150.0, 0.9),
                scored("l2", Category::Lighting, 120.0, 0.8),
                scored("l3", Category::Lighting, 400.0, 0.7),
            ],
        );

        let mut p = profile(RoomType::LivingRoom, 1000.0);
        p.multiples.insert(Category::Lighting, 3);

        // 灯具子预算 187.5 + 前序结余 332.5 = 520：l1、l2 放得下，l3 放不下
        let set = composer().compose(&p, &candidates);
        let lighting: Vec<&str> = set
            .items
            .iter()
            .filter(|i| i.category == Category::Lighting)
            .map(|i| i.card.id.as_str())
            .collect();
        assert_eq!(lighting, vec!["l1", "l2"]);
        assert!(!set.over_budget);
        assert!(set.total_cost <= 1000.0);
        // 未点名的类目仍每类一件
        assert_eq!(set.items.iter().filter(|i| i.category == Category::Sofa).count(), 1);
    }

    #[test]
    fn test_invariant_cost_within_budget_unless_flagged() {
        let mut candidates = BTreeMap::new();
        candidates.insert(Category::Decor, vec![scored("d", Category::Decor, 900.0, 0.9)]);
        candidates.insert(
            Category::Lighting,
            vec![scored("l", Category::Lighting, 400.0, 0.9)],
        );

        let set = composer().compose(&profile(RoomType::Other, 1000.0), &candidates);
        if !set.over_budget {
            assert!(set.total_cost <= 1000.0);
        } else {
            assert!(!set.over_budget_categories.is_empty());
        }
    }

    #[test]
    fn test_zero_budget_everything_flagged() {
        let mut candidates = BTreeMap::new();
        candidates.insert(Category::Decor, vec![scored("d", Category::Decor, 10.0, 0.9)]);
        candidates.insert(Category::Lighting, vec![scored("l", Category::Lighting, 10.0, 0.9)]);

        let set = composer().compose(&profile(RoomType::Other, 0.0), &candidates);
        assert!(set.over_budget);
        assert_eq!(set.over_budget_categories.len(), 2);
    }
}
