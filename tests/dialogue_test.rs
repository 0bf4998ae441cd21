//! 对话全流程集成测试

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use nest::catalog::{Category, InMemoryStore, ProductCard};
    use nest::core::{
        DialogueState, EngineError, Orchestrator, OrchestratorOptions, RetryPolicy, SessionManager,
    };
    use nest::llm::{EmbeddingProvider, HashEmbedder, LlmClient, ScriptedLlm};
    use nest::memory::Message;
    use nest::recommend::{
        Composer, FeedbackHandler, RequirementExtractor, RetrievalEngine, WeightTable,
    };

    /// 测试目录：厨房三类目（价格覆盖宽松/紧张两种预算）+ 卧室床品
    fn test_catalog() -> Vec<ProductCard> {
        vec![
            ProductCard::new("counter-a", "Ceramic vase trio", Category::CounterDecor, 120.0)
                .with_description("Three glazed ceramic vases for the kitchen counter"),
            ProductCard::new("counter-b", "Marble serving tray", Category::CounterDecor, 80.0)
                .with_description("Round marble tray for counter styling"),
            ProductCard::new("stor-a", "Oak wall shelf", Category::Storage, 200.0)
                .with_description("Open oak shelf for jars and cookbooks"),
            ProductCard::new("stor-b", "Steel kitchen rack", Category::Storage, 90.0)
                .with_description("Freestanding steel rack with four tiers"),
            ProductCard::new("light-a", "Brass pendant", Category::Lighting, 150.0)
                .with_description("Brass pendant light for over the island"),
            ProductCard::new("light-b", "Spot rail light", Category::Lighting, 60.0)
                .with_description("Adjustable three-spot ceiling rail"),
            ProductCard::new("bed-a", "Birch bed frame", Category::Bed, 400.0)
                .with_description("Queen bed frame in solid birch"),
        ]
    }

    struct Harness {
        llm: Arc<ScriptedLlm>,
        orchestrator: Orchestrator,
    }

    async fn harness() -> Harness {
        harness_with(OrchestratorOptions::default()).await
    }

    async fn harness_with(opts: OrchestratorOptions) -> Harness {
        let llm = Arc::new(ScriptedLlm::new());
        let orchestrator = orchestrator_with(llm.clone(), opts).await;
        Harness { llm, orchestrator }
    }

    async fn orchestrator_with(llm: Arc<dyn LlmClient>, opts: OrchestratorOptions) -> Orchestrator {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::default());

        let mut store = InMemoryStore::new();
        for card in test_catalog() {
            let text = format!("{} {}", card.name, card.description);
            let vector = embedder.embed(&text).await.unwrap();
            store.insert(card, vector);
        }

        let retry = RetryPolicy {
            attempts: 1,
            base_backoff: Duration::from_millis(1),
            call_timeout: Duration::from_secs(5),
        };
        Orchestrator::new(
            RequirementExtractor::new(llm.clone(), opts.llm_retry.clone()),
            RetrievalEngine::new(embedder, Arc::new(store), retry, 0.0),
            Composer::new(WeightTable::default()),
            FeedbackHandler::new(llm.clone(), opts.llm_retry.clone()),
            llm,
            Arc::new(SessionManager::new(60)),
            opts,
        )
    }

    /// 一轮「厨房 + 1000 预算」直达推荐集；空回复使呈现走确定性渲染
    async fn present_kitchen_set(h: &Harness, session: &str) -> nest::core::TurnOutput {
        h.llm
            .push(r#"{"room": "kitchen", "budget": 1000, "confidence": 0.95}"#);
        h.llm.push("");
        h.orchestrator
            .handle_turn(session, "Help me furnish my kitchen, up to 1000")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_elicits_missing_budget_then_presents() {
        let h = harness().await;
        let session = h.orchestrator.start_session().await;

        // 只给房间：应追问预算，不产生推荐
        h.llm.push(r#"{"room": "kitchen", "confidence": 0.9}"#);
        let out = h
            .orchestrator
            .handle_turn(&session, "I want to redo my kitchen")
            .await
            .unwrap();
        assert_eq!(out.state, DialogueState::Eliciting);
        assert!(out.recommendation.is_none());
        assert!(out.assistant_text.to_lowercase().contains("budget"));

        // 补上预算：进入检索与合成
        h.llm.push(r#"{"budget": 1000, "confidence": 0.9}"#);
        h.llm.push("");
        let out = h.orchestrator.handle_turn(&session, "around 1000").await.unwrap();
        assert_eq!(out.state, DialogueState::AwaitingFeedback);

        let set = out.recommendation.expect("set composed once profile is ready");
        assert!(set.coverage.contains(&Category::CounterDecor));
        assert!(set.coverage.contains(&Category::Storage));
        assert!(set.coverage.contains(&Category::Lighting));
        assert!(set.total_cost <= 1000.0);
        assert!(!set.over_budget);
        assert!(out.assistant_text.contains("Total:"));
    }

    #[tokio::test]
    async fn test_accept_ends_session() {
        let h = harness().await;
        let session = h.orchestrator.start_session().await;
        present_kitchen_set(&h, &session).await;

        let out = h
            .orchestrator
            .handle_turn(&session, "Perfect, I'll take them!")
            .await
            .unwrap();
        assert_eq!(out.state, DialogueState::Done);

        // 终态后续轮只提示重开会话
        let out = h.orchestrator.handle_turn(&session, "one more thing").await.unwrap();
        assert_eq!(out.state, DialogueState::Done);
        assert!(out.assistant_text.contains("new session"));
    }

    #[tokio::test]
    async fn test_rejected_item_is_not_reoffered() {
        let h = harness().await;
        let session = h.orchestrator.start_session().await;
        let first = present_kitchen_set(&h, &session).await;
        let first_set = first.recommendation.unwrap();
        let rejected_id = first_set.item_for(Category::Lighting).unwrap().card.id.clone();
        let kept_storage = first_set.item_for(Category::Storage).unwrap().card.id.clone();

        h.llm.push("");
        let out = h
            .orchestrator
            .handle_turn(&session, "I don't like the lamp")
            .await
            .unwrap();
        assert_eq!(out.state, DialogueState::AwaitingFeedback);

        let set = out.recommendation.unwrap();
        let new_lighting = set.item_for(Category::Lighting).expect("lighting refilled");
        assert_ne!(new_lighting.card.id, rejected_id);
        // 未被点名的类目保持原选择
        assert_eq!(set.item_for(Category::Storage).unwrap().card.id, kept_storage);
    }

    #[tokio::test]
    async fn test_budget_tightening_recomposes_within_new_ceiling() {
        let h = harness().await;
        let session = h.orchestrator.start_session().await;
        present_kitchen_set(&h, &session).await;

        h.llm.push("");
        let out = h
            .orchestrator
            .handle_turn(&session, "my budget is 300 now")
            .await
            .unwrap();
        let set = out.recommendation.unwrap();
        assert!(set.total_cost <= 300.0);
        assert!(!set.over_budget);
        // 贵件在收紧后必然换成便宜款
        assert_eq!(set.item_for(Category::Storage).unwrap().card.id, "stor-b");
        assert_eq!(set.item_for(Category::Lighting).unwrap().card.id, "light-b");
    }

    #[tokio::test]
    async fn test_room_change_rebuilds_set() {
        let h = harness().await;
        let session = h.orchestrator.start_session().await;
        present_kitchen_set(&h, &session).await;

        h.llm.push("");
        let out = h
            .orchestrator
            .handle_turn(&session, "actually let's do the bedroom")
            .await
            .unwrap();
        assert_eq!(out.state, DialogueState::AwaitingFeedback);

        let set = out.recommendation.unwrap();
        assert!(set.coverage.contains(&Category::Bed));
        assert!(!set.coverage.contains(&Category::CounterDecor));
        assert_eq!(set.item_for(Category::Bed).unwrap().card.id, "bed-a");
    }

    #[tokio::test]
    async fn test_infeasible_budget_is_flagged_not_fatal() {
        let h = harness().await;
        let session = h.orchestrator.start_session().await;

        h.llm
            .push(r#"{"room": "kitchen", "budget": 100, "confidence": 0.95}"#);
        h.llm.push("");
        let out = h
            .orchestrator
            .handle_turn(&session, "kitchen, but only 100 to spend")
            .await
            .unwrap();
        assert_eq!(out.state, DialogueState::AwaitingFeedback);

        let set = out.recommendation.unwrap();
        assert!(set.over_budget);
        assert!(!set.over_budget_categories.is_empty());
        // 仍给出完整覆盖，让用户决定加预算还是砍类目
        assert_eq!(set.coverage.len(), 3);
        assert!(out.assistant_text.contains("over your budget"));
    }

    #[tokio::test]
    async fn test_repeated_ambiguity_aborts() {
        let h = harness_with(OrchestratorOptions {
            max_feedback_retries: 2,
            ..Default::default()
        })
        .await;
        let session = h.orchestrator.start_session().await;

        for _ in 0..2 {
            h.llm.push("sorry, what?");
            let out = h.orchestrator.handle_turn(&session, "blorp").await.unwrap();
            assert_eq!(out.state, DialogueState::Eliciting);
        }

        h.llm.push("sorry, what?");
        let out = h.orchestrator.handle_turn(&session, "blorp").await.unwrap();
        assert_eq!(out.state, DialogueState::Aborted);
        assert!(out.assistant_text.contains("new session"));
    }

    /// 永不返回的客户端，模拟挂起的外部 LLM 服务
    struct HangingLlm;

    #[async_trait]
    impl LlmClient for HangingLlm {
        async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_hung_llm_ends_turn_gracefully_session_alive() {
        let opts = OrchestratorOptions {
            llm_retry: RetryPolicy {
                attempts: 1,
                base_backoff: Duration::from_millis(1),
                call_timeout: Duration::from_millis(50),
            },
            ..Default::default()
        };
        let orchestrator = orchestrator_with(Arc::new(HangingLlm), opts).await;
        let session = orchestrator.start_session().await;

        // LLM 挂起：本轮道歉结束，会话不升级为 Aborted
        let started = std::time::Instant::now();
        let out = orchestrator
            .handle_turn(&session, "furnish my kitchen, 1000")
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(out.assistant_text.contains("try again"));
        assert!(!out.state.is_terminal());

        // 下一轮仍可进入，不是 SessionExpired / SessionNotFound
        let out = orchestrator.handle_turn(&session, "hello?").await.unwrap();
        assert!(!out.state.is_terminal());
    }

    #[tokio::test]
    async fn test_unknown_session_errors() {
        let h = harness().await;
        let err = h.orchestrator.handle_turn("session_nope", "hi").await.unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound(_)));
    }
}
