//! Weighted score fusion of the vector and lexical rankings.

use std::collections::BTreeMap;

use ragdb_core::config::validate_alpha;
use ragdb_core::error::Result;
use ragdb_core::types::{ChunkId, RankedResult, SearchHit};

/// Min-max normalize one side's scores into `[0, 1]`.
///
/// The range is taken over finite scores and computed in f64, so any two
/// distinct finite scores stay distinct. When every finite candidate shares
/// one score (including a single candidate) they all normalize to 1.0.
/// `+inf` maps to 1.0; `-inf` and NaN map to 0.0. A chunk listed twice keeps
/// its best score.
#[allow(clippy::cast_possible_truncation)]
pub fn normalize(hits: &[SearchHit]) -> BTreeMap<ChunkId, f32> {
    let mut best: BTreeMap<ChunkId, f32> = BTreeMap::new();
    for hit in hits {
        let score = if hit.score.is_nan() { f32::NEG_INFINITY } else { hit.score };
        best.entry(hit.id.clone()).and_modify(|s| *s = s.max(score)).or_insert(score);
    }
    let (min, max) = best
        .values()
        .filter(|s| s.is_finite())
        .map(|&s| f64::from(s))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s), hi.max(s)));
    let span = max - min;
    for score in best.values_mut() {
        *score = match *score {
            s if s == f32::INFINITY => 1.0,
            s if s == f32::NEG_INFINITY => 0.0,
            s if span > 0.0 => ((f64::from(s) - min) / span).clamp(0.0, 1.0) as f32,
            _ => 1.0,
        };
    }
    best
}

/// Blend both rankings as `alpha * vector + (1 - alpha) * lexical`.
///
/// Scores are normalized per side over the candidates given; a chunk missing
/// from one side contributes 0 from it. The union is sorted descending by
/// fused score, ties by ascending chunk id, and truncated to `k`.
pub fn fuse(vector: &[SearchHit], lexical: &[SearchHit], alpha: f32, k: usize) -> Result<Vec<RankedResult>> {
    validate_alpha(alpha)?;
    let v = normalize(vector);
    let l = normalize(lexical);

    let mut ids: Vec<&ChunkId> = v.keys().chain(l.keys()).collect();
    ids.sort();
    ids.dedup();

    let mut fused: Vec<RankedResult> = ids
        .into_iter()
        .map(|id| {
            let vector_score = v.get(id).copied().unwrap_or(0.0);
            let lexical_score = l.get(id).copied().unwrap_or(0.0);
            let fused_score = (alpha * vector_score + (1.0 - alpha) * lexical_score).clamp(0.0, 1.0);
            RankedResult { chunk_id: id.clone(), fused_score, vector_score, lexical_score }
        })
        .collect();
    fused.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score).then_with(|| a.chunk_id.cmp(&b.chunk_id)));
    fused.truncate(k);
    Ok(fused)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::types::{DocumentId, SourceKind};

    fn hit(seq: u32, score: f32) -> SearchHit {
        SearchHit::new(ChunkId::new(DocumentId::from("d"), seq), score, SourceKind::Vector)
    }

    #[test]
    fn equal_scores_normalize_to_one() {
        let n = normalize(&[hit(0, 0.3), hit(1, 0.3)]);
        assert!(n.values().all(|&s| s == 1.0));
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn near_equal_scores_stay_ordered() {
        let n = normalize(&[hit(0, 0.5), hit(1, 0.500_000_06)]);
        assert_eq!(n[&ChunkId::new(DocumentId::from("d"), 0)], 0.0);
        assert_eq!(n[&ChunkId::new(DocumentId::from("d"), 1)], 1.0);
    }

    #[test]
    fn non_finite_scores_map_to_the_bounds() {
        let n = normalize(&[hit(0, f32::INFINITY), hit(1, f32::NAN), hit(2, f32::NEG_INFINITY), hit(3, 2.0), hit(4, 1.0)]);
        let got: Vec<f32> = n.values().copied().collect();
        assert_eq!(got, vec![1.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn extreme_finite_range_does_not_overflow() {
        let n = normalize(&[hit(0, f32::MIN), hit(1, f32::MAX), hit(2, 0.0)]);
        let got: Vec<f32> = n.values().copied().collect();
        assert_eq!(got[0], 0.0);
        assert_eq!(got[1], 1.0);
        assert!((got[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn duplicates_keep_best_score() {
        let n = normalize(&[hit(0, 0.1), hit(0, 0.9), hit(1, 0.5)]);
        assert_eq!(n.len(), 2);
        assert_eq!(n[&ChunkId::new(DocumentId::from("d"), 0)], 1.0);
        assert_eq!(n[&ChunkId::new(DocumentId::from("d"), 1)], 0.0);
    }
}
