use ragdb_core::config::{VectorBackendKind, VectorConfig};
use ragdb_core::traits::VectorIndex;
use ragdb_core::types::{ChunkId, DocumentId, Metric};
use ragdb_core::Error;
use ragdb_vector::{FlatIndex, VectorStore};

fn cid(doc: &str, seq: u32) -> ChunkId {
    ChunkId::new(DocumentId::from(doc), seq)
}

#[tokio::test]
async fn cosine_query_orders_by_similarity() {
    let index = FlatIndex::new(3, Metric::Cosine).expect("index");
    index.upsert(&cid("d", 0), &[1.0, 0.0, 0.0]).await.unwrap();
    index.upsert(&cid("d", 1), &[0.7, 0.7, 0.0]).await.unwrap();
    index.upsert(&cid("d", 2), &[0.0, 0.0, 5.0]).await.unwrap();

    let hits = index.query(&[2.0, 0.0, 0.0], 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, cid("d", 0));
    assert!((hits[0].score - 1.0).abs() < 1e-6, "cosine ignores magnitude");
    assert_eq!(hits[1].id, cid("d", 1));
    assert!(hits[0].score >= hits[1].score);
}

#[tokio::test]
async fn inner_product_uses_magnitude() {
    let index = FlatIndex::new(2, Metric::InnerProduct).expect("index");
    index.upsert(&cid("d", 0), &[1.0, 0.0]).await.unwrap();
    index.upsert(&cid("d", 1), &[3.0, 0.0]).await.unwrap();
    let hits = index.query(&[1.0, 0.0], 5).await.unwrap();
    assert_eq!(hits[0].id, cid("d", 1));
    assert!((hits[0].score - 3.0).abs() < 1e-6);
}

#[tokio::test]
async fn dimension_mismatch_on_upsert_and_query() {
    let index = FlatIndex::new(3, Metric::Cosine).expect("index");
    assert!(matches!(
        index.upsert(&cid("d", 0), &[1.0, 2.0]).await,
        Err(Error::DimensionMismatch { expected: 3, actual: 2 })
    ));
    assert!(matches!(index.query(&[1.0; 4], 1).await, Err(Error::DimensionMismatch { expected: 3, actual: 4 })));
    assert_eq!(index.count().await.unwrap(), 0, "failed upsert leaves no record");
    assert!(matches!(FlatIndex::new(0, Metric::Cosine), Err(Error::InvalidConfiguration(_))));
}

#[tokio::test]
async fn upsert_replaces_and_remove_is_idempotent() {
    let index = FlatIndex::new(2, Metric::Cosine).expect("index");
    index.remove(&cid("ghost", 0)).await.expect("removing unknown id is a no-op");

    index.upsert(&cid("d", 0), &[1.0, 0.0]).await.unwrap();
    index.upsert(&cid("d", 0), &[0.0, 1.0]).await.unwrap();
    let info = index.info().await.unwrap();
    assert_eq!(info.count, 1, "no duplicate record");
    assert_eq!(info.dimensionality, 2);
    assert_eq!(info.metric, Metric::Cosine);
    let hits = index.query(&[0.0, 1.0], 1).await.unwrap();
    assert!((hits[0].score - 1.0).abs() < 1e-6, "second vector replaced the first");

    index.remove(&cid("d", 0)).await.unwrap();
    index.remove(&cid("d", 0)).await.unwrap();
    assert_eq!(index.count().await.unwrap(), 0);
    assert!(index.query(&[0.0, 1.0], 3).await.unwrap().is_empty());
}

#[tokio::test]
async fn ties_break_by_chunk_id() {
    let index = FlatIndex::new(2, Metric::Cosine).expect("index");
    for seq in [9, 1, 4] {
        index.upsert(&cid("d", seq), &[1.0, 1.0]).await.unwrap();
    }
    index.upsert(&cid("a", 3), &[1.0, 1.0]).await.unwrap();
    let ids: Vec<ChunkId> = index.query(&[1.0, 1.0], 10).await.unwrap().into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![cid("a", 3), cid("d", 1), cid("d", 4), cid("d", 9)]);
    assert!(index.query(&[1.0, 1.0], 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn zero_vectors_score_zero_under_cosine() {
    let index = FlatIndex::new(2, Metric::Cosine).expect("index");
    index.upsert(&cid("d", 0), &[0.0, 0.0]).await.unwrap();
    let hits = index.query(&[1.0, 0.0], 1).await.unwrap();
    assert_eq!(hits[0].score, 0.0);
}

#[tokio::test]
async fn store_selects_flat_backend_from_config() {
    let config = VectorConfig { backend: VectorBackendKind::Flat, metric: Metric::InnerProduct, ..VectorConfig::default() };
    let store = VectorStore::from_config(&config, 4).await.expect("store");
    assert!(matches!(store, VectorStore::Flat(_)));
    assert_eq!(store.dimensionality(), 4);
    assert_eq!(store.metric(), Metric::InnerProduct);
    store.upsert(&cid("d", 0), &[1.0, 0.0, 0.0, 0.0]).await.unwrap();
    assert_eq!(store.info().await.unwrap().count, 1);
}

#[tokio::test]
async fn non_finite_vectors_are_rejected() {
    let index = FlatIndex::new(2, Metric::InnerProduct).expect("index");
    for bad in [[f32::NAN, 0.0], [f32::INFINITY, 1.0], [0.0, f32::NEG_INFINITY]] {
        assert!(matches!(index.upsert(&cid("d", 0), &bad).await, Err(Error::InvalidVector(_))));
        assert!(matches!(index.query(&bad, 1).await, Err(Error::InvalidVector(_))));
    }
    assert_eq!(index.count().await.unwrap(), 0);
}

#[tokio::test]
async fn inner_product_overflow_saturates() {
    let index = FlatIndex::new(2, Metric::InnerProduct).expect("index");
    index.upsert(&cid("d", 0), &[1e20, 0.0]).await.unwrap();
    index.upsert(&cid("d", 1), &[1.0, 0.0]).await.unwrap();
    let hits = index.query(&[1e20, 0.0], 2).await.unwrap();
    assert!(hits.iter().all(|h| h.score.is_finite()));
    assert_eq!(hits[0].id, cid("d", 0));
    assert_eq!(hits[0].score, f32::MAX);
    assert!((hits[1].score - 1e20).abs() / 1e20 < 1e-6);
}
