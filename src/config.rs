//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NEST__*` 覆盖（双下划线表示嵌套，如 `NEST__LLM__MODEL=gpt-4o`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub compose: ComposeSection,
}

/// [app] 段：应用名、回复生成的上下文预算
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 回复生成时组装历史的 token 预算
    #[serde(default = "default_context_budget_tokens")]
    pub context_budget_tokens: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            context_budget_tokens: default_context_budget_tokens(),
        }
    }
}

fn default_context_budget_tokens() -> usize {
    2048
}

/// [llm] 段：对话模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [embedding] 段：向量化模型
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSection {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            base_url: None,
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// [store] 段：向量库连接与检索参数
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Qdrant 地址；未设置时用内置演示目录
    pub qdrant_url: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    pub api_key: Option<String>,
    /// 相似度下限，低于此分的候选直接丢弃
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    /// 每类目抓取的候选数
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            qdrant_url: None,
            collection: default_collection(),
            api_key: None,
            score_threshold: default_score_threshold(),
            top_k: default_top_k(),
        }
    }
}

fn default_collection() -> String {
    "products".to_string()
}

fn default_score_threshold() -> f32 {
    0.75
}

fn default_top_k() -> usize {
    5
}

/// [session] 段：会话超时与追问上限
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// 无活动多久后会话过期（秒）
    #[serde(default = "default_session_timeout_secs")]
    pub timeout_secs: u64,
    /// 连续歧义/无法归类的追问上限，超过则中止会话
    #[serde(default = "default_max_feedback_retries")]
    pub max_feedback_retries: u32,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout_secs(),
            max_feedback_retries: default_max_feedback_retries(),
        }
    }
}

fn default_session_timeout_secs() -> u64 {
    1800
}

fn default_max_feedback_retries() -> u32 {
    3
}

/// [retry] 段：外部调用（向量化 / 检索）的重试策略
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// 单次外部调用超时（秒）
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    200
}

fn default_call_timeout_secs() -> u64 {
    30
}

/// [compose] 段：类目预算权重覆盖（键为类目名，如 sofa = 0.5）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ComposeSection {
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            embedding: EmbeddingSection::default(),
            store: StoreSection::default(),
            session: SessionSection::default(),
            retry: RetrySection::default(),
            compose: ComposeSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 NEST__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NEST__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NEST")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
