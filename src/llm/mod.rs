//! LLM 与嵌入服务抽象及其实现

mod embedding;
mod mock;
mod openai;
mod traits;

pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use mock::{HashEmbedder, ScriptedLlm};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;
