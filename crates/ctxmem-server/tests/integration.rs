//! Integration tests covering the Context Service end to end: message
//! append, auto-summarization, semantic retrieval, the automatic SIMILAR
//! edge, keyword fallback degradation, and crash recovery.


use ctxmem::embedder::NullEmbedder;
use ctxmem::error::CtxError;
use ctxmem::service::SummarizeOutcome;
use ctxmem_types::{Direction, Role};
use std::sync::Arc;
use std::time::Duration;
use test_utils::{build_service, build_service_with_embedder, test_config, DIMENSIONS};

/// Scenario A -- add-and-retrieve.
#[tokio::test]
async fn add_and_retrieve_round_trips_a_single_message() {
    let (service, _dir) = build_service(test_config()).await;

    service
        .add_message(
            "c1",
            Role::User,
            "hello".to_string(),
            0.5,
            Default::default(),
        )
        .await
        .expect("add_message");

    let ctx = service
        .get_context("c1")
        .await
        .expect("get_context")
        .expect("context exists");

    assert_eq!(ctx.messages.len(), 1);
    assert_eq!(ctx.messages[0].role, Role::User);
    assert_eq!(ctx.messages[0].content, "hello");
    assert_eq!(ctx.messages[0].importance, 0.5);
    assert!(ctx.messages[0].tags.is_empty());
    assert!(!ctx.has_summary);
}

/// Scenario B -- auto-summarize threshold.
#[tokio::test]
async fn third_message_triggers_background_summary_within_budget() {
    let (service, _dir) = build_service(test_config()).await;

    for i in 0..2 {
        service
            .add_message(
                "c1",
                Role::User,
                format!("message {i}"),
                0.5,
                Default::default(),
            )
            .await
            .expect("add_message");
        let ctx = service.get_context("c1").await.unwrap().unwrap();
        assert!(!ctx.has_summary, "should not summarize before threshold");
    }

    service
        .add_message(
            "c1",
            Role::User,
            "message 2".to_string(),
            0.5,
            Default::default(),
        )
        .await
        .expect("add_message");

    let mut summarized = false;
    for _ in 0..10 {
        let ctx = service.get_context("c1").await.unwrap().unwrap();
        if ctx.has_summary {
            let summary = ctx.summary.expect("summary present once hasSummary");
            assert_eq!(summary.message_count, 3);
            summarized = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(summarized, "background summary did not land within 500ms");
}

/// Scenario C -- semantic retrieval ranks the on-topic context first.
#[tokio::test]
async fn semantic_search_ranks_related_context_above_unrelated_one() {
    let (service, _dir) = build_service(test_config()).await;

    service
        .add_message(
            "pg",
            Role::User,
            "PostgreSQL replication and write-ahead log".to_string(),
            0.5,
            Default::default(),
        )
        .await
        .unwrap();
    service.summarize_now("pg").await.unwrap();

    service
        .add_message(
            "cookies",
            Role::User,
            "Chocolate chip cookie recipe".to_string(),
            0.5,
            Default::default(),
        )
        .await
        .unwrap();
    service.summarize_now("cookies").await.unwrap();

    let hits = service
        .find_similar("streaming replication lag", 2)
        .await
        .unwrap();

    assert!(!hits.is_empty());
    assert_eq!(hits[0].context_id, "pg");
    if hits.len() > 1 {
        assert!(hits[0].similarity > hits[1].similarity);
    }
}

/// Scenario D -- summarizing two topically-overlapping contexts creates an
/// automatic outgoing SIMILAR edge between them.
#[tokio::test]
async fn summarizing_similar_contexts_creates_automatic_similar_edge() {
    let mut config = test_config();
    config.similarity_threshold = 0.1;
    let (service, _dir) = build_service(config).await;

    service
        .add_message(
            "first",
            Role::User,
            "database replication write-ahead log durability".to_string(),
            0.5,
            Default::default(),
        )
        .await
        .unwrap();
    service.summarize_now("first").await.unwrap();

    service
        .add_message(
            "second",
            Role::User,
            "database replication write-ahead log consistency".to_string(),
            0.5,
            Default::default(),
        )
        .await
        .unwrap();
    service.summarize_now("second").await.unwrap();

    let related = service
        .get_related("first", Some(ctxmem_types::RelationshipType::Similar), Direction::Outgoing)
        .await;
    assert!(
        related.contains(&"second".to_string()),
        "expected automatic SIMILAR edge, got {related:?}"
    );
}

/// Scenario E -- with the embedder permanently unavailable, the same
/// operations as Scenario C still succeed via keyword-overlap fallback.
#[tokio::test]
async fn fallback_mode_still_ranks_keyword_overlap_correctly() {
    let embedder = Arc::new(NullEmbedder::new(DIMENSIONS));
    let (service, _dir) = build_service_with_embedder(test_config(), embedder).await;

    service
        .add_message(
            "pg",
            Role::User,
            "PostgreSQL replication and write-ahead log".to_string(),
            0.5,
            Default::default(),
        )
        .await
        .unwrap();
    service.summarize_now("pg").await.unwrap();

    service
        .add_message(
            "cookies",
            Role::User,
            "Chocolate chip cookie recipe".to_string(),
            0.5,
            Default::default(),
        )
        .await
        .unwrap();
    service.summarize_now("cookies").await.unwrap();

    let hits = service
        .find_similar("streaming replication lag", 2)
        .await
        .unwrap();

    assert!(!hits.is_empty());
    assert_eq!(hits[0].context_id, "pg");
}

/// Scenario F -- a torn final line in the message log is dropped, not
/// treated as corruption, on the next load.
#[tokio::test]
async fn crash_mid_append_drops_only_the_torn_final_line() {
    let (service, dir) = build_service(test_config()).await;

    for i in 0..10 {
        service
            .add_message(
                "c1",
                Role::User,
                format!("message {i}"),
                0.5,
                Default::default(),
            )
            .await
            .unwrap();
    }

    // Simulate a crash mid-append: truncate the last line's closing brace.
    let messages_path = dir.path().join("messages").join("c1.messages.jsonl");
    let content = tokio::fs::read_to_string(&messages_path).await.unwrap();
    let mut lines: Vec<&str> = content.lines().collect();
    let last = lines.pop().unwrap();
    let torn = &last[..last.len() - 5];
    let mut rebuilt = lines.join("\n");
    rebuilt.push('\n');
    rebuilt.push_str(torn);
    tokio::fs::write(&messages_path, rebuilt).await.unwrap();

    let ctx = service.get_context("c1").await.unwrap().unwrap();
    assert_eq!(ctx.messages.len(), 9);
    assert_eq!(ctx.messages[8].content, "message 8");
}

/// Invariant 4 -- embedding the same summary twice updates the existing
/// vector entry in place rather than growing the index.
#[tokio::test]
async fn resummarizing_a_context_does_not_duplicate_its_vector_entry() {
    let (service, dir) = build_service(test_config()).await;

    service
        .add_message("c1", Role::User, "graph traversal algorithms".to_string(), 0.5, Default::default())
        .await
        .unwrap();
    service.summarize_now("c1").await.unwrap();
    service.summarize_now("c1").await.unwrap();

    let index_file = dir.path().join("vectors").join("context-map.json");
    let raw = tokio::fs::read_to_string(&index_file).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let live_labels = parsed["context_to_label"].as_object().unwrap().len();
    assert_eq!(live_labels, 1, "re-summarizing must replace, not duplicate, the vector entry");
}

/// Invariant 7 -- deleting a context removes it from every store and from
/// any edges that touched it.
#[tokio::test]
async fn delete_context_cascades_to_vector_and_graph() {
    let (service, _dir) = build_service(test_config()).await;

    service
        .add_message("a", Role::User, "shared topic vocabulary here".to_string(), 0.5, Default::default())
        .await
        .unwrap();
    service.summarize_now("a").await.unwrap();
    service
        .add_message("b", Role::User, "shared topic vocabulary too".to_string(), 0.5, Default::default())
        .await
        .unwrap();
    service.summarize_now("b").await.unwrap();
    service
        .add_relationship("a", "b", ctxmem_types::RelationshipType::References, 0.5)
        .await
        .unwrap();

    let existed = service.delete_context("a").await.unwrap();
    assert!(existed);

    assert!(service.get_context("a").await.unwrap().is_none());
    let related_to_b = service
        .get_related("b", None, Direction::Both)
        .await;
    assert!(!related_to_b.contains(&"a".to_string()));

    let hits = service.find_similar("shared topic vocabulary", 5).await.unwrap();
    assert!(!hits.iter().any(|h| h.context_id == "a"));
}

/// Invariant 5 -- an outgoing edge from s to t is visible as an incoming
/// edge from t's perspective.
#[tokio::test]
async fn related_contexts_are_symmetric_across_direction() {
    let (service, _dir) = build_service(test_config()).await;
    service
        .add_message("a", Role::User, "hi".to_string(), 0.5, Default::default())
        .await
        .unwrap();
    service
        .add_message("b", Role::User, "hi".to_string(), 0.5, Default::default())
        .await
        .unwrap();
    service
        .add_relationship("a", "b", ctxmem_types::RelationshipType::References, 0.5)
        .await
        .unwrap();

    let from_a = service
        .get_related("a", Some(ctxmem_types::RelationshipType::References), Direction::Outgoing)
        .await;
    let from_b = service
        .get_related("b", Some(ctxmem_types::RelationshipType::References), Direction::Incoming)
        .await;
    assert!(from_a.contains(&"b".to_string()));
    assert!(from_b.contains(&"a".to_string()));
}

#[tokio::test]
async fn add_relationship_rejects_when_target_context_is_unknown() {
    let (service, _dir) = build_service(test_config()).await;
    service
        .add_message("c1", Role::User, "hi".to_string(), 0.5, Default::default())
        .await
        .unwrap();

    let err = service
        .add_relationship("c1", "missing", ctxmem_types::RelationshipType::References, 0.5)
        .await
        .unwrap_err();
    assert!(matches!(err, CtxError::NotFound(_)));
}

#[tokio::test]
async fn summarize_now_on_empty_context_reports_empty() {
    let (service, _dir) = build_service(test_config()).await;
    let outcome = service.summarize_now("never-seen").await.unwrap();
    assert!(matches!(outcome, SummarizeOutcome::Empty));
}
