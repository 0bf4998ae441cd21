//! 商品卡片与类目体系
//!
//! RoomType（房间类型）决定必选类目集合；Category（商品类目）映射到预算权重表。
//! 商品卡片在一轮对话内不可变，权威数据在外部向量库中。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 房间类型（与向量库 payload 中的房间分类一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    LivingRoom,
    Kitchen,
    Bedroom,
    Bathroom,
    Other,
}

impl RoomType {
    /// 该房间类型的必选类目（按展示顺序）
    pub fn mandatory_categories(&self) -> &'static [Category] {
        match self {
            RoomType::LivingRoom => &[Category::Sofa, Category::Table, Category::Lighting],
            RoomType::Kitchen => &[Category::CounterDecor, Category::Lighting, Category::Storage],
            RoomType::Bedroom => &[Category::Bed, Category::Storage, Category::Lighting],
            RoomType::Bathroom => &[Category::Storage, Category::Lighting, Category::Decor],
            RoomType::Other => &[Category::Decor, Category::Lighting],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::LivingRoom => "living_room",
            RoomType::Kitchen => "kitchen",
            RoomType::Bedroom => "bedroom",
            RoomType::Bathroom => "bathroom",
            RoomType::Other => "other",
        }
    }

    /// 宽松解析：接受下划线形式与常见口语写法
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "living_room" | "livingroom" | "lounge" => Some(RoomType::LivingRoom),
            "kitchen" => Some(RoomType::Kitchen),
            "bedroom" => Some(RoomType::Bedroom),
            "bathroom" => Some(RoomType::Bathroom),
            "other" | "kids_room" | "nursery" | "office" | "hallway" => Some(RoomType::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for RoomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 商品类目（房间类目的细分，如沙发 / 桌子 / 灯具）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Sofa,
    Bed,
    Table,
    CounterDecor,
    Storage,
    Lighting,
    Decor,
}

impl Category {
    /// 基础预算权重（座类 40% / 储物 20% / 灯具 15% / 装饰 25%），
    /// 合成时按所选类目归一化为预算份额
    pub fn base_weight(&self) -> f64 {
        match self {
            Category::Sofa | Category::Bed => 0.40,
            Category::Table | Category::CounterDecor | Category::Decor => 0.25,
            Category::Storage => 0.20,
            Category::Lighting => 0.15,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sofa => "sofa",
            Category::Bed => "bed",
            Category::Table => "table",
            Category::CounterDecor => "counter_decor",
            Category::Storage => "storage",
            Category::Lighting => "lighting",
            Category::Decor => "decor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "sofa" | "couch" => Some(Category::Sofa),
            "bed" => Some(Category::Bed),
            "table" | "desk" => Some(Category::Table),
            "counter_decor" | "counter" => Some(Category::CounterDecor),
            "storage" | "wardrobe" | "shelf" | "cabinet" => Some(Category::Storage),
            "lighting" | "lamp" | "light" => Some(Category::Lighting),
            "decor" | "decoration" => Some(Category::Decor),
            _ => None,
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Sofa,
            Category::Bed,
            Category::Table,
            Category::CounterDecor,
            Category::Storage,
            Category::Lighting,
            Category::Decor,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 商品卡片：检索结果的最小展示单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCard {
    /// 稳定 ID（向量库中的 point id）
    pub id: String,
    pub name: String,
    pub category: Category,
    /// 价格，非负
    pub price: f64,
    /// 自由属性（材质、颜色、尺寸等），key 排序保证序列化稳定
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub description: String,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

impl ProductCard {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: Category, price: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            price: price.max(0.0),
            attributes: BTreeMap::new(),
            description: String::new(),
            url: None,
            image_url: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// 带相似度分数的候选卡片
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCard {
    pub card: ProductCard,
    pub score: f32,
}
