#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use vitae_core::VitaeError;
    use vitae_retrieval::mock::MockEmbedding;
    use vitae_retrieval::repository::VectorRepository;
    use vitae_retrieval::service::RetrievalService;

    fn repo() -> VectorRepository {
        VectorRepository::open_in_memory(3).unwrap()
    }

    // ── Repository ─────────────────────────────────────────────

    #[test]
    fn test_save_assigns_fresh_ids() {
        let repo = repo();
        let meta = serde_json::json!({"source": "cv"});
        let a = repo.save("doc a", &[1.0, 0.0, 0.0], &meta).unwrap();
        let b = repo.save("doc b", &[0.0, 1.0, 0.0], &meta).unwrap();
        assert!(b > a);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn test_save_rejects_wrong_dimension() {
        let repo = repo();
        let err = repo
            .save("bad", &[1.0, 0.0], &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(
            err,
            VitaeError::DimensionMismatch {
                got: 2,
                expected: 3
            }
        ));
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_find_similar_orders_by_descending_similarity() {
        let repo = repo();
        let meta = serde_json::json!({});
        repo.save("far", &[0.2, 1.0, 0.0], &meta).unwrap();
        repo.save("exact", &[1.0, 0.0, 0.0], &meta).unwrap();
        repo.save("near", &[0.9, 0.1, 0.0], &meta).unwrap();

        let hits = repo.find_similar(&[1.0, 0.0, 0.0], 10, 0.1).unwrap();
        let contents: Vec<&str> = hits.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["exact", "near", "far"]);
        assert!(hits[0].similarity > hits[1].similarity);
        assert!(hits[1].similarity > hits[2].similarity);
    }

    #[test]
    fn test_find_similar_breaks_ties_by_ascending_id() {
        let repo = repo();
        let meta = serde_json::json!({});
        let first = repo.save("twin a", &[1.0, 0.0, 0.0], &meta).unwrap();
        let second = repo.save("twin b", &[1.0, 0.0, 0.0], &meta).unwrap();

        let hits = repo.find_similar(&[1.0, 0.0, 0.0], 10, 0.5).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, first);
        assert_eq!(hits[1].id, second);
    }

    #[test]
    fn test_threshold_is_strict() {
        let repo = repo();
        repo.save("orthogonal", &[0.0, 1.0, 0.0], &serde_json::json!({}))
            .unwrap();
        // similarity computes to exactly 0.0, which does not exceed 0.0
        let hits = repo.find_similar(&[1.0, 0.0, 0.0], 10, 0.0).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_limit_caps_results() {
        let repo = repo();
        for i in 0..5 {
            repo.save(
                &format!("doc {i}"),
                &[1.0, 0.0, 0.0],
                &serde_json::json!({}),
            )
            .unwrap();
        }
        let hits = repo.find_similar(&[1.0, 0.0, 0.0], 2, 0.5).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_metadata_survives_roundtrip() {
        let repo = repo();
        let meta = serde_json::json!({"source": "projects", "year": 2024});
        repo.save("doc", &[1.0, 0.0, 0.0], &meta).unwrap();
        let hits = repo.find_similar(&[1.0, 0.0, 0.0], 1, 0.5).unwrap();
        assert_eq!(hits[0].metadata, meta);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let repo = repo();
        let id = repo
            .save("doc", &[1.0, 0.0, 0.0], &serde_json::json!({}))
            .unwrap();
        assert!(repo.delete(id).unwrap());
        assert!(!repo.delete(id).unwrap());
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_repository_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");
        {
            let repo = VectorRepository::open(&path, 3).unwrap();
            repo.save("durable", &[1.0, 0.0, 0.0], &serde_json::json!({}))
                .unwrap();
        }
        let repo = VectorRepository::open(&path, 3).unwrap();
        let hits = repo.find_similar(&[1.0, 0.0, 0.0], 1, 0.5).unwrap();
        assert_eq!(hits[0].content, "durable");
    }

    // ── Service ────────────────────────────────────────────────

    fn service(provider: MockEmbedding) -> RetrievalService {
        RetrievalService::new(
            Arc::new(provider),
            Arc::new(repo()),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_ingest_then_search_finds_document() {
        let provider = MockEmbedding::new(3)
            .with_vector("RAG is Retrieval-Augmented Generation", vec![1.0, 0.1, 0.0])
            .with_vector("What is RAG?", vec![1.0, 0.0, 0.0]);
        let svc = service(provider);

        let id = svc
            .ingest(
                "RAG is Retrieval-Augmented Generation",
                serde_json::json!({"source": "cv"}),
            )
            .await
            .unwrap();

        let hits = svc.search("What is RAG?", 3, 0.5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert!(hits[0].similarity > 0.9);
    }

    #[tokio::test]
    async fn test_deleted_document_no_longer_appears() {
        let provider = MockEmbedding::new(3);
        let svc = service(provider);

        let id = svc.ingest("ephemeral", serde_json::json!({})).await.unwrap();
        assert!(!svc.search("ephemeral", 5, 0.5).await.unwrap().is_empty());

        svc.delete(id).await.unwrap();
        assert!(svc.search("ephemeral", 5, 0.5).await.unwrap().is_empty());
        // Second delete observes the same state
        assert!(!svc.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_ingested_vector_has_configured_dimension() {
        let provider = MockEmbedding::new(3).with_vector("short", vec![1.0, 0.0]);
        let svc = service(provider);
        // Provider misbehaves and returns 2 dims; the save must reject it.
        let err = svc.ingest("short", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, VitaeError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates_from_ingest() {
        let provider = MockEmbedding::new(3).failing_next(1);
        let svc = service(provider);
        let err = svc.ingest("doc", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, VitaeError::Embedding(_)));
    }
}
