//! 需求画像：用户意图的结构化表示与合并规则
//!
//! 画像只由需求抽取器与反馈处理器产生的增量（ProfileDelta）修改；合并规则：
//! 标量字段 last-write-wins，预算只降不升（除非增量显式声明加价），
//! 必需/排除属性做并集且排除优先于必需。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::catalog::{Category, RoomType};

/// 当前需求画像（每会话一份，单轮内独占修改）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequirementProfile {
    pub room: Option<RoomType>,
    /// 风格标签（如 minimalist / scandinavian）
    pub style_tags: BTreeSet<String>,
    /// 预算上限（非负）
    pub budget_ceiling: Option<f64>,
    /// 必需属性，保持插入顺序以便检索降级时按「最早加入」丢弃
    pub required: Vec<(String, String)>,
    /// 排除属性（与必需冲突时排除获胜）
    pub excluded: BTreeSet<String>,
    /// 用户显式要求多个选项的类目 → 数量；未出现的类目每类至多一件
    pub multiples: BTreeMap<Category, u32>,
}

/// 画像增量：抽取器 / 反馈处理器的输出，由调用方合并
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDelta {
    pub room: Option<RoomType>,
    pub budget: Option<f64>,
    /// 用户显式声明加价时为 true，否则预算只能下降
    #[serde(default)]
    pub budget_raise_explicit: bool,
    #[serde(default)]
    pub style_tags: Vec<String>,
    #[serde(default)]
    pub require: Vec<(String, String)>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// 类目 → 用户要求的选项数量（1 表示取消多选）
    #[serde(default)]
    pub multiples: Vec<(Category, u32)>,
}

impl ProfileDelta {
    /// 是否没有携带任何信息（抽取为空时视为歧义）
    pub fn is_empty(&self) -> bool {
        self.room.is_none()
            && self.budget.is_none()
            && self.style_tags.is_empty()
            && self.require.is_empty()
            && self.exclude.is_empty()
            && self.multiples.is_empty()
    }
}

/// 画像里下一个需要追问的字段，按优先级 room > budget > style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    Room,
    Budget,
    Style,
}

impl RequirementProfile {
    /// 合并增量（见模块说明的三条规则）
    pub fn apply(&mut self, delta: &ProfileDelta) {
        if let Some(room) = delta.room {
            self.room = Some(room);
        }

        if let Some(budget) = delta.budget {
            let budget = budget.max(0.0);
            match self.budget_ceiling {
                Some(current) if budget > current && !delta.budget_raise_explicit => {
                    // 未显式声明加价，忽略上调
                }
                _ => self.budget_ceiling = Some(budget),
            }
        }

        for tag in &delta.style_tags {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() {
                self.style_tags.insert(tag);
            }
        }

        // 必需属性：同 key 覆盖并移到末尾（末尾 = 最近加入）
        for (key, value) in &delta.require {
            self.required.retain(|(k, _)| k != key);
            self.required.push((key.clone(), value.clone()));
        }

        for key in &delta.exclude {
            self.excluded.insert(key.clone());
        }

        // 每类目数量 last-write-wins；回到 1 即移除多选
        for (category, count) in &delta.multiples {
            if *count > 1 {
                self.multiples.insert(*category, *count);
            } else {
                self.multiples.remove(category);
            }
        }

        // 排除优先于必需
        self.required.retain(|(k, _)| !self.excluded.contains(k));
    }

    /// 是否具备进入检索的最低条件（房间类型 + 预算上限）
    pub fn ready_for_retrieval(&self) -> bool {
        self.room.is_some() && self.budget_ceiling.is_some()
    }

    /// 下一个缺失字段，全部齐备时返回 None
    pub fn missing_field(&self) -> Option<MissingField> {
        if self.room.is_none() {
            Some(MissingField::Room)
        } else if self.budget_ceiling.is_none() {
            Some(MissingField::Budget)
        } else if self.style_tags.is_empty() {
            Some(MissingField::Style)
        } else {
            None
        }
    }

    /// 丢弃最早加入的必需属性（检索降级用），返回被丢弃的属性
    pub fn relax_oldest_required(required: &[(String, String)]) -> Option<(Vec<(String, String)>, (String, String))> {
        let (first, rest) = required.split_first()?;
        Some((rest.to_vec(), first.clone()))
    }

    /// 合成某类目的检索描述文本（嵌入查询用；对相同画像输出确定）
    pub fn describe_for(&self, category: crate::catalog::Category) -> String {
        let mut parts: Vec<String> = Vec::new();
        parts.push(format!("{} for a {}", category.as_str().replace('_', " "), self.room.map(|r| r.as_str()).unwrap_or("room").replace('_', " ")));
        if !self.style_tags.is_empty() {
            let tags: Vec<&str> = self.style_tags.iter().map(|s| s.as_str()).collect();
            parts.push(format!("style: {}", tags.join(", ")));
        }
        for (key, value) in &self.required {
            parts.push(format!("{}: {}", key, value));
        }
        parts.join("; ")
    }

    /// 画像摘要（进入提示词的那一段，上下文裁剪时永不丢弃）
    pub fn summary(&self) -> String {
        let room = self.room.map(|r| r.as_str().replace('_', " ")).unwrap_or_else(|| "unknown".into());
        let budget = self
            .budget_ceiling
            .map(|b| format!("{:.0}", b))
            .unwrap_or_else(|| "unknown".into());
        let styles: Vec<&str> = self.style_tags.iter().map(|s| s.as_str()).collect();
        let required: Vec<String> = self.required.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let excluded: Vec<&str> = self.excluded.iter().map(|s| s.as_str()).collect();
        format!(
            "Requirement profile: room={}; budget={}; styles=[{}]; required=[{}]; excluded=[{}]",
            room,
            budget,
            styles.join(", "),
            required.join(", "),
            excluded.join(", ")
        )
    }
}
