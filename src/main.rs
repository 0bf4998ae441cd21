//! Nest - Rust 室内设计推荐引擎
//!
//! 入口：初始化日志、装配组件（LLM / 向量库 / 编排器），运行控制台对话循环。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use nest::catalog::{demo_catalog, CatalogStore, InMemoryStore, QdrantStore};
use nest::config::{load_config, AppConfig};
use nest::core::{EngineError, Orchestrator, OrchestratorOptions, RetryPolicy, SessionManager};
use nest::llm::{
    create_embedder_from_config, EmbeddingProvider, HashEmbedder, LlmClient, OpenAiClient,
    ScriptedLlm,
};
use nest::recommend::{Composer, FeedbackHandler, RequirementExtractor, RetrievalEngine, WeightTable};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nest::observability::init();

    let config = load_config(None).context("Failed to load config")?;
    let (orchestrator, llm) = build_orchestrator(&config)
        .await
        .context("Failed to assemble engine")?;

    let session_id = orchestrator.start_session().await;
    tracing::info!("session {} started", session_id);

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(
            b"Nest interior design assistant. Tell me which room you're furnishing \
              and your budget. Type 'quit' to exit.\n",
        )
        .await?;
    if std::env::var("OPENAI_API_KEY").is_err() {
        stdout
            .write_all(
                b"(offline mode: OPENAI_API_KEY is not set, so replies come from a \
                  canned echo client and real conversations will not work)\n",
            )
            .await?;
    }
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            continue;
        }
        if matches!(input, "quit" | "exit") {
            break;
        }

        match orchestrator.handle_turn(&session_id, input).await {
            Ok(output) => {
                stdout
                    .write_all(format!("{}\n", output.assistant_text).as_bytes())
                    .await?;
                if output.state.is_terminal() {
                    break;
                }
            }
            Err(EngineError::SessionExpired) => {
                stdout
                    .write_all(b"Session expired. Please restart to begin a new one.\n")
                    .await?;
                break;
            }
            Err(e) => {
                tracing::error!("turn failed: {}", e);
                stdout
                    .write_all(format!("Something went wrong: {}\n", e).as_bytes())
                    .await?;
            }
        }
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }

    let (prompt_tokens, completion_tokens, total_tokens) = llm.token_usage();
    if total_tokens > 0 {
        tracing::info!(
            "session token usage: prompt {}, completion {}, total {}",
            prompt_tokens,
            completion_tokens,
            total_tokens
        );
    }

    Ok(())
}

/// 按配置装配编排器；无 API Key / 无 Qdrant 时回退到离线组件
async fn build_orchestrator(
    config: &AppConfig,
) -> anyhow::Result<(Orchestrator, Arc<dyn LlmClient>)> {
    let api_key = std::env::var("OPENAI_API_KEY").ok();

    let llm: Arc<dyn LlmClient> = match api_key.as_deref() {
        Some(key) if !key.is_empty() => Arc::new(OpenAiClient::new(
            config.llm.base_url.as_deref(),
            &config.llm.model,
            Some(key),
        )),
        _ => {
            tracing::warn!("OPENAI_API_KEY not set, using offline echo client");
            Arc::new(ScriptedLlm::new())
        }
    };

    // 哈希向量的相似度分布没有经过校准，降级时不启用分数下限
    let (embedder, score_threshold): (Arc<dyn EmbeddingProvider>, f32) =
        match create_embedder_from_config(
            config.embedding.base_url.as_deref(),
            &config.embedding.model,
            api_key.as_deref(),
        ) {
            Some(embedder) => (embedder, config.store.score_threshold),
            None => {
                tracing::warn!("no embedding credentials, using deterministic hash embedder");
                (Arc::new(HashEmbedder::default()), 0.0)
            }
        };

    let store: Arc<dyn CatalogStore> = match &config.store.qdrant_url {
        Some(url) => Arc::new(QdrantStore::new(
            url,
            &config.store.collection,
            config.store.api_key.clone(),
        )),
        None => {
            tracing::warn!("no qdrant_url configured, using built-in demo catalog");
            let mut store = InMemoryStore::new();
            for card in demo_catalog() {
                let text = format!("{} {}", card.name, card.description);
                let vector = embedder
                    .embed(&text)
                    .await
                    .map_err(|e| anyhow::anyhow!("demo catalog embedding failed: {}", e))?;
                store.insert(card, vector);
            }
            Arc::new(store)
        }
    };

    let retry = RetryPolicy {
        attempts: config.retry.attempts,
        base_backoff: Duration::from_millis(config.retry.base_backoff_ms),
        call_timeout: Duration::from_secs(config.retry.call_timeout_secs),
    };
    // LLM 补全比嵌入 / 向量查询慢，单次超时单独配置
    let llm_retry = RetryPolicy {
        call_timeout: Duration::from_secs(config.llm.timeouts.request),
        ..retry.clone()
    };

    let weights: BTreeMap<String, f64> = config.compose.weights.clone().into_iter().collect();
    let sessions = Arc::new(SessionManager::new(config.session.timeout_secs));

    // 周期清理过期会话
    let cleanup = sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let removed = cleanup.cleanup_expired().await;
            if removed > 0 {
                tracing::info!("cleaned up {} expired sessions", removed);
            }
        }
    });

    let orchestrator = Orchestrator::new(
        RequirementExtractor::new(llm.clone(), llm_retry.clone()),
        RetrievalEngine::new(embedder, store, retry, score_threshold),
        Composer::new(WeightTable::with_overrides(&weights)),
        FeedbackHandler::new(llm.clone(), llm_retry.clone()),
        llm.clone(),
        sessions,
        OrchestratorOptions {
            max_top_k: config.store.top_k,
            max_feedback_retries: config.session.max_feedback_retries,
            context_budget_tokens: config.app.context_budget_tokens,
            llm_retry,
        },
    );
    Ok((orchestrator, llm))
}
