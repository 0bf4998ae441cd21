//! Qdrant REST 客户端
//!
//! 通过 HTTP JSON 接口实现 CatalogStore：/points/search 做过滤相似度查询，
//! /points 按 id 解析卡片。payload 字段沿用目录入库约定：
//! item_name / item_categories / item_description / item_price / metadata。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::{Category, ProductCard};
use crate::catalog::store::{CatalogStore, QueryFilter};

/// Qdrant 向量库客户端
pub struct QdrantStore {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
}

impl QdrantStore {
    pub fn new(base_url: &str, collection: &str, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            collection: collection.to_string(),
        }
    }

    fn request(&self, url: &str, body: Value) -> reqwest::RequestBuilder {
        let mut req = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("api-key", key);
        }
        req
    }

    fn build_filter(filter: &QueryFilter) -> Value {
        let mut must: Vec<Value> = Vec::new();
        if let Some(category) = filter.category {
            must.push(json!({ "key": "item_categories", "match": { "value": category.as_str() } }));
        }
        for (key, value) in &filter.required {
            must.push(json!({ "key": format!("metadata.{}", key), "match": { "value": value } }));
        }

        let mut must_not: Vec<Value> = Vec::new();
        if !filter.exclude_ids.is_empty() {
            must_not.push(json!({ "has_id": filter.exclude_ids }));
        }

        json!({ "must": must, "must_not": must_not })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: Value,
    score: f32,
}

#[derive(Deserialize)]
struct PointsResponse {
    result: Vec<Point>,
}

#[derive(Deserialize)]
struct Point {
    id: Value,
    #[serde(default)]
    payload: Value,
}

/// point id 可能是整数或 UUID 字符串，统一转为 String
fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 从 payload 还原商品卡片
fn card_from_payload(id: String, payload: &Value) -> Option<ProductCard> {
    let name = payload.get("item_name")?.as_str()?.to_string();
    let category = payload
        .get("item_categories")
        .and_then(|v| v.as_str())
        .and_then(Category::parse)
        .unwrap_or(Category::Decor);
    let price = payload
        .get("item_price")
        .and_then(|v| {
            v.as_f64()
                .or_else(|| v.as_str().and_then(|s| s.parse::<f64>().ok()))
        })
        .unwrap_or(0.0);

    let mut card = ProductCard::new(id, name, category, price);
    if let Some(desc) = payload.get("item_description").and_then(|v| v.as_str()) {
        card.description = desc.to_string();
    }
    if let Some(meta) = payload.get("metadata").and_then(|v| v.as_object()) {
        for (key, value) in meta {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            match key.as_str() {
                "url" => card.url = Some(value),
                "image_url" => card.image_url = Some(value),
                _ => {
                    card.attributes.insert(key.clone(), value);
                }
            }
        }
    }
    Some(card)
}

#[async_trait]
impl CatalogStore for QdrantStore {
    async fn query(
        &self,
        vector: &[f32],
        filter: &QueryFilter,
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<(String, f32)>, String> {
        let url = format!("{}/collections/{}/points/search", self.base_url, self.collection);
        let body = json!({
            "vector": vector,
            "limit": top_k,
            "score_threshold": score_threshold,
            "with_payload": false,
            "filter": Self::build_filter(filter),
        });

        let response = self
            .request(&url, body)
            .send()
            .await
            .map_err(|e| format!("qdrant search failed: {}", e))?
            .error_for_status()
            .map_err(|e| format!("qdrant search failed: {}", e))?
            .json::<SearchResponse>()
            .await
            .map_err(|e| format!("qdrant search decode failed: {}", e))?;

        Ok(response
            .result
            .into_iter()
            .map(|hit| (id_to_string(&hit.id), hit.score))
            .collect())
    }

    async fn get_card(&self, id: &str) -> Result<Option<ProductCard>, String> {
        let url = format!("{}/collections/{}/points", self.base_url, self.collection);
        // 整数 id 需以数字形式传回
        let id_value: Value = id.parse::<u64>().map(Value::from).unwrap_or_else(|_| Value::from(id));
        let body = json!({ "ids": [id_value], "with_payload": true });

        let response = self
            .request(&url, body)
            .send()
            .await
            .map_err(|e| format!("qdrant points failed: {}", e))?
            .error_for_status()
            .map_err(|e| format!("qdrant points failed: {}", e))?
            .json::<PointsResponse>()
            .await
            .map_err(|e| format!("qdrant points decode failed: {}", e))?;

        Ok(response
            .result
            .into_iter()
            .next()
            .and_then(|p| card_from_payload(id_to_string(&p.id), &p.payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_encodes_category_required_and_exclusions() {
        let filter = QueryFilter {
            category: Some(Category::Lighting),
            exclude_ids: vec!["lamp-01".into()],
            required: vec![("color".into(), "white".into())],
        };
        let encoded = QdrantStore::build_filter(&filter);
        let must = encoded["must"].as_array().unwrap();
        assert_eq!(must.len(), 2);
        assert_eq!(must[0]["key"], "item_categories");
        assert_eq!(must[0]["match"]["value"], "lighting");
        assert_eq!(must[1]["key"], "metadata.color");
        let must_not = encoded["must_not"].as_array().unwrap();
        assert_eq!(must_not[0]["has_id"][0], "lamp-01");
    }

    #[test]
    fn test_card_from_payload() {
        let payload = json!({
            "item_name": "Arc floor lamp",
            "item_categories": "lighting",
            "item_description": "Arc floor lamp with dimmer",
            "item_price": "95.0",
            "metadata": { "color": "black", "url": "https://example.com/lamp" }
        });
        let card = card_from_payload("lamp-01".into(), &payload).unwrap();
        assert_eq!(card.category, Category::Lighting);
        assert_eq!(card.price, 95.0);
        assert_eq!(card.attributes.get("color"), Some(&"black".to_string()));
        assert_eq!(card.url.as_deref(), Some("https://example.com/lamp"));
    }

    #[test]
    fn test_card_requires_name() {
        assert!(card_from_payload("x".into(), &json!({ "item_price": 10 })).is_none());
    }
}
