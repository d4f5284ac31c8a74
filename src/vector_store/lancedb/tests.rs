use super::*;
use crate::vector_store::MetadataValue;
use tempfile::TempDir;

async fn open_store() -> (LanceVectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = LanceVectorStore::open(&temp_dir.path().join("vectors"))
        .await
        .expect("Failed to open vector store");
    (store, temp_dir)
}

fn record(id: &str, values: Vec<f32>, headline: &str) -> VectorRecord {
    let mut metadata = Metadata::new();
    metadata.insert("headline".to_string(), MetadataValue::from(headline));
    metadata.insert("chunk_index".to_string(), MetadataValue::from(0_usize));
    VectorRecord {
        id: id.to_string(),
        values,
        metadata,
    }
}

#[tokio::test]
async fn ensure_index_creates_and_reuses_table() {
    let (store, _temp_dir) = open_store().await;
    let spec = IndexSpec::new("news-articles-index", 4, DistanceMetric::Cosine);

    let first = store.ensure_index(&spec).await.expect("create");
    let second = store.ensure_index(&spec).await.expect("reuse");

    assert_eq!(first, second);
    assert_eq!(store.count(&first).await.expect("count"), 0);
}

#[tokio::test]
async fn ensure_index_detects_mismatch() {
    let (store, _temp_dir) = open_store().await;
    store
        .ensure_index(&IndexSpec::new("news", 4, DistanceMetric::Cosine))
        .await
        .expect("create");

    let err = store
        .ensure_index(&IndexSpec::new("news", 8, DistanceMetric::Cosine))
        .await
        .expect_err("dimension differs");
    assert!(matches!(err, RagError::Config(_)));

    let err = store
        .ensure_index(&IndexSpec::new("news", 4, DistanceMetric::Euclidean))
        .await
        .expect_err("metric differs");
    assert!(matches!(err, RagError::Config(ref msg) if msg.contains("cosine")));
}

#[tokio::test]
async fn upsert_replaces_records_with_same_id() {
    let (store, _temp_dir) = open_store().await;
    let index = store
        .ensure_index(&IndexSpec::new("news", 4, DistanceMetric::Cosine))
        .await
        .expect("create");

    store
        .upsert(
            &index,
            &[
                record("1-0", vec![1.0, 0.0, 0.0, 0.0], "Swimming gold"),
                record("2-0", vec![0.0, 1.0, 0.0, 0.0], "Election debate"),
            ],
        )
        .await
        .expect("first upsert");
    let summary = store
        .upsert(
            &index,
            &[record("1-0", vec![1.0, 0.0, 0.0, 0.0], "Swimming gold (updated)")],
        )
        .await
        .expect("second upsert");

    assert_eq!(summary.upserted, 1);
    assert_eq!(summary.batches, 1);
    assert_eq!(store.count(&index).await.expect("count"), 2);
}

#[tokio::test]
async fn delete_removes_only_listed_ids() {
    let (store, _temp_dir) = open_store().await;
    let index = store
        .ensure_index(&IndexSpec::new("news", 4, DistanceMetric::Cosine))
        .await
        .expect("create");
    store
        .upsert(
            &index,
            &[
                record("1-0", vec![1.0, 0.0, 0.0, 0.0], "Swimming gold"),
                record("1-1", vec![0.0, 1.0, 0.0, 0.0], "Swimming gold"),
                record("o'neill-0", vec![0.0, 0.0, 1.0, 0.0], "Quoted id"),
            ],
        )
        .await
        .expect("upsert");

    store
        .delete(&index, &["1-1".to_string(), "o'neill-0".to_string(), "9-9".to_string()])
        .await
        .expect("delete");

    let ids = store.list_ids(&index).await.expect("list");
    assert_eq!(ids, ["1-0"]);
    assert_eq!(store.count(&index).await.expect("count"), 1);
}

#[tokio::test]
async fn query_returns_best_match_first() {
    let (store, _temp_dir) = open_store().await;
    let index = store
        .ensure_index(&IndexSpec::new("news", 4, DistanceMetric::Cosine))
        .await
        .expect("create");

    store
        .upsert(
            &index,
            &[
                record("1-0", vec![1.0, 0.0, 0.0, 0.0], "Swimming gold"),
                record("2-0", vec![0.0, 1.0, 0.0, 0.0], "Election debate"),
                record("3-0", vec![0.7, 0.7, 0.0, 0.0], "Mixed"),
            ],
        )
        .await
        .expect("upsert");

    let matches = store
        .query(&index, &[1.0, 0.0, 0.0, 0.0], 2)
        .await
        .expect("query");

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].record.id, "1-0");
    assert!((matches[0].score - 1.0).abs() < 1e-4);
    assert!(matches[0].score >= matches[1].score);
    assert_eq!(
        matches[0].record.metadata_str("headline"),
        Some("Swimming gold")
    );
    assert_eq!(matches[0].record.values.len(), 4);
}

#[tokio::test]
async fn query_validates_dimension_and_top_k() {
    let (store, _temp_dir) = open_store().await;
    let index = store
        .ensure_index(&IndexSpec::new("news", 4, DistanceMetric::Cosine))
        .await
        .expect("create");

    assert!(
        store
            .query(&index, &[1.0, 0.0, 0.0, 0.0], 0)
            .await
            .expect("top_k 0")
            .is_empty()
    );
    assert!(matches!(
        store.query(&index, &[1.0, 0.0], 3).await,
        Err(RagError::VectorStore(_))
    ));
}

#[tokio::test]
async fn invalid_batch_is_rejected_before_writing() {
    let (store, _temp_dir) = open_store().await;
    let index = store
        .ensure_index(&IndexSpec::new("news", 4, DistanceMetric::Cosine))
        .await
        .expect("create");

    let result = store
        .upsert(
            &index,
            &[
                record("1-0", vec![1.0, 0.0, 0.0, 0.0], "ok"),
                record("2-0", vec![1.0, 0.0], "bad"),
            ],
        )
        .await;

    assert!(matches!(result, Err(RagError::VectorStore(_))));
    assert_eq!(store.count(&index).await.expect("count"), 0);
}

#[tokio::test]
async fn drop_index_removes_table() {
    let (store, _temp_dir) = open_store().await;
    let spec = IndexSpec::new("news", 4, DistanceMetric::Cosine);
    store.ensure_index(&spec).await.expect("create");

    store.drop_index("news").await.expect("drop");
    store.drop_index("news").await.expect("dropping twice is fine");

    let spec = IndexSpec::new("news", 8, DistanceMetric::Cosine);
    store
        .ensure_index(&spec)
        .await
        .expect("recreated with a new dimension");
}

#[test]
fn distance_conversion() {
    assert!((similarity_from_distance(DistanceMetric::Cosine, 0.0) - 1.0).abs() < f32::EPSILON);
    assert!((similarity_from_distance(DistanceMetric::Euclidean, 3.0) - 0.25).abs() < f32::EPSILON);
}
