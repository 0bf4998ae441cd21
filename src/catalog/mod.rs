//! 商品目录：类目体系、卡片模型与向量库访问

mod card;
mod qdrant;
pub(crate) mod store;

pub use card::{Category, ProductCard, RoomType, ScoredCard};
pub use qdrant::QdrantStore;
pub use store::{cosine_similarity, demo_catalog, CatalogStore, InMemoryStore, QueryFilter};
