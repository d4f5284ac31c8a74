use super::*;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn vectors_have_declared_dimension_and_unit_norm() {
    let embedder = HashingEmbedder::new(384);
    let vector = embedder
        .embed("Olympic swimming final in Paris")
        .expect("should embed");
    assert_eq!(vector.len(), 384);
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[test]
fn encoding_is_deterministic_and_case_insensitive() {
    let embedder = HashingEmbedder::new(64);
    let a = embedder.embed("Gold Medal").expect("should embed");
    let b = embedder.embed("gold medal").expect("should embed");
    assert_eq!(a, b);
}

#[test]
fn shared_vocabulary_scores_higher() {
    let embedder = HashingEmbedder::new(384);
    let query = embedder
        .embed("Who won gold in swimming?")
        .expect("should embed");
    let related = embedder
        .embed("She won gold in the swimming relay.")
        .expect("should embed");
    let unrelated = embedder
        .embed("Central bank keeps interest rates unchanged.")
        .expect("should embed");
    assert!(cosine(&query, &related) > cosine(&query, &unrelated));
}

#[test]
fn empty_text_is_zero_vector() {
    let embedder = HashingEmbedder::new(16);
    let vector = embedder.embed("   ").expect("should embed");
    assert!(vector.iter().all(|v| *v == 0.0));
}

#[test]
fn batch_preserves_order() {
    let embedder = HashingEmbedder::new(32);
    let texts = vec!["alpha".to_string(), "beta".to_string()];
    let batch = embedder.embed_batch(&texts).expect("should embed");
    assert_eq!(batch[0], embedder.embed("alpha").expect("should embed"));
    assert_eq!(batch[1], embedder.embed("beta").expect("should embed"));
    assert_eq!(embedder.model(), "feature-hashing-32");
}
