use ragdb_core::types::{ChunkId, DocumentId, SearchHit, SourceKind};
use ragdb_core::Error;
use ragdb_hybrid::fuse;

fn id(doc: &str) -> ChunkId {
    ChunkId::new(DocumentId::from(doc), 0)
}

fn v(doc: &str, score: f32) -> SearchHit {
    SearchHit::new(id(doc), score, SourceKind::Vector)
}

fn l(doc: &str, score: f32) -> SearchHit {
    SearchHit::new(id(doc), score, SourceKind::Lexical)
}

fn order(results: &[ragdb_core::types::RankedResult]) -> Vec<String> {
    results.iter().map(|r| r.chunk_id.document.to_string()).collect()
}

#[test]
fn fused_scores_stay_in_unit_interval() {
    let vector = [v("a", 0.91), v("b", -0.2), v("c", 0.33), v("d", 0.33)];
    let lexical = [l("c", 12.5), l("e", 0.01), l("a", 3.0)];
    for alpha in [0.0, 0.25, 0.5, 0.75, 1.0] {
        let fused = fuse(&vector, &lexical, alpha, 10).unwrap();
        assert_eq!(fused.len(), 5, "union of both sides");
        for r in &fused {
            assert!((0.0..=1.0).contains(&r.fused_score), "{r:?}");
            assert!((0.0..=1.0).contains(&r.vector_score));
            assert!((0.0..=1.0).contains(&r.lexical_score));
        }
        assert!(fused.windows(2).all(|w| w[0].fused_score >= w[1].fused_score));
    }
}

#[test]
fn alpha_extremes_reproduce_single_side_order() {
    let vector = [v("a", 0.9), v("b", 0.5), v("c", 0.1)];
    let lexical = [l("c", 10.0), l("b", 5.0), l("d", 1.0)];

    let pure_vector = fuse(&vector, &lexical, 1.0, 10).unwrap();
    assert_eq!(order(&pure_vector), ["a", "b", "c", "d"]);
    assert_eq!(pure_vector[0].fused_score, 1.0);
    assert_eq!(pure_vector[2].fused_score, 0.0);

    let pure_lexical = fuse(&vector, &lexical, 0.0, 10).unwrap();
    assert_eq!(order(&pure_lexical)[..2], ["c", "b"]);
    assert!((pure_lexical[1].lexical_score - 4.0 / 9.0).abs() < 1e-6);
    // Chunks at zero fall back to chunk id order.
    assert_eq!(order(&pure_lexical)[2..], ["a", "d"]);
}

#[test]
fn disjoint_sides_are_unioned_with_zero_substitution() {
    let fused = fuse(&[v("x", 0.2)], &[l("w", 7.0)], 0.5, 5).unwrap();
    assert_eq!(order(&fused), ["w", "x"], "equal fused scores tie-break by id");
    assert_eq!(fused[0].vector_score, 0.0);
    assert_eq!(fused[0].lexical_score, 1.0);
    assert_eq!(fused[1].vector_score, 1.0);
    assert_eq!(fused[1].lexical_score, 0.0);
    assert!(fused.iter().all(|r| (r.fused_score - 0.5).abs() < 1e-6));
}

#[test]
fn truncates_to_k() {
    let vector = [v("a", 0.9), v("b", 0.5), v("c", 0.1)];
    assert_eq!(fuse(&vector, &[], 0.5, 2).unwrap().len(), 2);
    assert!(fuse(&vector, &[], 0.5, 0).unwrap().is_empty());
    assert!(fuse(&[], &[], 0.5, 3).unwrap().is_empty());
}

#[test]
fn rejects_alpha_outside_unit_interval() {
    for alpha in [-0.1, 1.01, f32::NAN] {
        assert!(matches!(fuse(&[], &[], alpha, 3), Err(Error::InvalidConfiguration(_))), "alpha {alpha}");
    }
}

#[test]
fn pure_vector_order_survives_near_equal_scores() {
    let fused = fuse(&[v("a", 0.5), v("b", 0.500_000_06)], &[], 1.0, 2).unwrap();
    assert_eq!(order(&fused), ["b", "a"]);
    assert_eq!(fused[0].fused_score, 1.0);
    assert_eq!(fused[1].fused_score, 0.0);
}

#[test]
fn non_finite_scores_keep_fused_scores_in_unit_interval() {
    let vector = [v("a", f32::INFINITY), v("b", 1e20), v("c", f32::NAN)];
    let lexical = [l("b", 3.0), l("c", f32::NEG_INFINITY)];
    let fused = fuse(&vector, &lexical, 0.5, 10).unwrap();
    assert_eq!(fused.len(), 3);
    assert!(fused.iter().all(|r| (0.0..=1.0).contains(&r.fused_score)), "{fused:?}");
    assert_eq!(order(&fused)[0], "b");
}
