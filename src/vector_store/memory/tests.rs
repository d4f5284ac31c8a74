use super::*;
use crate::vector_store::{DistanceMetric, MetadataValue};

fn record(id: &str, values: Vec<f32>, headline: &str) -> VectorRecord {
    let mut metadata = crate::vector_store::Metadata::new();
    metadata.insert("headline".to_string(), MetadataValue::from(headline));
    VectorRecord {
        id: id.to_string(),
        values,
        metadata,
    }
}

async fn store_with_index(metric: DistanceMetric) -> (MemoryVectorStore, IndexHandle) {
    let store = MemoryVectorStore::new();
    let handle = store
        .ensure_index(&IndexSpec::new("news", 3, metric))
        .await
        .expect("index should be created");
    (store, handle)
}

#[tokio::test]
async fn ensure_index_is_idempotent() {
    let (store, first) = store_with_index(DistanceMetric::Cosine).await;
    let second = store
        .ensure_index(&IndexSpec::new("news", 3, DistanceMetric::Cosine))
        .await
        .expect("same spec should be reused");
    assert_eq!(first, second);
}

#[tokio::test]
async fn ensure_index_rejects_mismatch() {
    let (store, _) = store_with_index(DistanceMetric::Cosine).await;

    let err = store
        .ensure_index(&IndexSpec::new("news", 4, DistanceMetric::Cosine))
        .await
        .expect_err("dimension differs");
    assert!(matches!(err, RagError::Config(ref msg) if msg.contains("dimension 3")));

    let err = store
        .ensure_index(&IndexSpec::new("news", 3, DistanceMetric::Euclidean))
        .await
        .expect_err("metric differs");
    assert!(matches!(err, RagError::Config(ref msg) if msg.contains("euclidean")));
}

#[tokio::test]
async fn upsert_replaces_same_id() {
    let (store, handle) = store_with_index(DistanceMetric::Cosine).await;

    store
        .upsert(&handle, &[record("a-0", vec![1.0, 0.0, 0.0], "old")])
        .await
        .expect("first upsert");
    let summary = store
        .upsert(&handle, &[record("a-0", vec![0.0, 1.0, 0.0], "new")])
        .await
        .expect("second upsert");

    assert_eq!(summary.upserted, 1);
    assert_eq!(store.len("news").await, 1);

    let matches = store
        .query(&handle, &[0.0, 1.0, 0.0], 1)
        .await
        .expect("query");
    assert_eq!(matches[0].record.metadata_str("headline"), Some("new"));
}

#[tokio::test]
async fn query_orders_by_similarity() {
    let (store, handle) = store_with_index(DistanceMetric::Cosine).await;
    store
        .upsert(
            &handle,
            &[
                record("far", vec![0.0, 0.0, 1.0], "far"),
                record("exact", vec![1.0, 0.0, 0.0], "exact"),
                record("near", vec![0.9, 0.1, 0.0], "near"),
            ],
        )
        .await
        .expect("upsert");

    let matches = store
        .query(&handle, &[1.0, 0.0, 0.0], 2)
        .await
        .expect("query");

    let ids: Vec<&str> = matches.iter().map(|m| m.record.id.as_str()).collect();
    assert_eq!(ids, ["exact", "near"]);
    assert!((matches[0].score - 1.0).abs() < 1e-6);
    assert!(matches[0].score >= matches[1].score);
}

#[tokio::test]
async fn euclidean_scores_are_bounded() {
    let (store, handle) = store_with_index(DistanceMetric::Euclidean).await;
    store
        .upsert(&handle, &[record("a", vec![1.0, 2.0, 0.0], "a")])
        .await
        .expect("upsert");

    let matches = store
        .query(&handle, &[1.0, 0.0, 0.0], 5)
        .await
        .expect("query");
    assert_eq!(matches.len(), 1);
    assert!((matches[0].score - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn invalid_records_write_nothing() {
    let (store, handle) = store_with_index(DistanceMetric::Cosine).await;

    let err = store
        .upsert(
            &handle,
            &[
                record("ok", vec![1.0, 0.0, 0.0], "ok"),
                record("short", vec![1.0, 0.0], "short"),
            ],
        )
        .await
        .expect_err("second record has the wrong dimension");
    assert!(matches!(err, RagError::VectorStore(_)));
    assert!(store.is_empty("news").await);

    let err = store
        .upsert(&handle, &[record(" ", vec![1.0, 0.0, 0.0], "blank")])
        .await
        .expect_err("blank id");
    assert!(matches!(err, RagError::VectorStore(_)));
}

#[tokio::test]
async fn query_edge_cases() {
    let (store, handle) = store_with_index(DistanceMetric::Cosine).await;

    assert!(
        store
            .query(&handle, &[1.0, 0.0, 0.0], 3)
            .await
            .expect("empty index")
            .is_empty()
    );
    assert!(
        store
            .query(&handle, &[1.0], 0)
            .await
            .expect("top_k 0 skips validation")
            .is_empty()
    );
    assert!(matches!(
        store.query(&handle, &[1.0, 0.0], 3).await,
        Err(RagError::VectorStore(_))
    ));
}

#[tokio::test]
async fn delete_removes_listed_ids() {
    let (store, handle) = store_with_index(DistanceMetric::Cosine).await;
    store
        .upsert(
            &handle,
            &[
                record("a-0", vec![1.0, 0.0, 0.0], "first"),
                record("a-1", vec![0.0, 1.0, 0.0], "second"),
                record("b-0", vec![0.0, 0.0, 1.0], "other"),
            ],
        )
        .await
        .expect("upsert");

    store
        .delete(&handle, &["a-1".to_string(), "missing-7".to_string()])
        .await
        .expect("unknown ids are ignored");

    let ids = store.list_ids(&handle).await.expect("list");
    assert_eq!(ids, ["a-0", "b-0"]);
}
