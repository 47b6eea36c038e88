use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{Link, LinkKind, Linkograph, LinkographMetrics, LinkographParams, Move};
use crate::embedding::{cosine, EmbeddingService};
use crate::error::EmbeddingResult;

/// Builds linkographs from move sequences.
///
/// Links are discovered target by target: for each move `j`, the earlier
/// moves `i` within `max_link_range` are compared in ascending order. The
/// kind of a link only depends on links among moves before `j`, which is
/// what makes a batch build and a sequence of [`LinkographBuilder::append`]
/// calls produce the same graph.
#[derive(Debug, Clone, Default)]
pub struct LinkographBuilder {
    params: LinkographParams,
}

impl LinkographBuilder {
    /// Create a builder with the given parameters
    pub fn new(params: LinkographParams) -> Self {
        Self { params }
    }

    /// Parameters in use.
    pub fn params(&self) -> &LinkographParams {
        &self.params
    }

    /// Embed the moves (lenient batch mode) and build the linkograph. Moves
    /// whose embedding is unavailable get no links.
    pub async fn build(
        &self,
        moves: Vec<Move>,
        embeddings: &EmbeddingService,
    ) -> EmbeddingResult<Linkograph> {
        let mut vectors: Vec<Option<Arc<Vec<f32>>>> = vec![None; moves.len()];
        let mut pending_idx = Vec::new();
        let mut pending_text = Vec::new();
        for (i, m) in moves.iter().enumerate() {
            match &m.embedding {
                Some(v) => vectors[i] = Some(Arc::new(v.clone())),
                None => {
                    pending_idx.push(i);
                    pending_text.push(m.text.clone());
                }
            }
        }

        if !pending_text.is_empty() {
            let fetched = embeddings.embed_many_lenient(&pending_text).await?;
            for (slot, vector) in pending_idx.into_iter().zip(fetched) {
                if vector.is_none() {
                    warn!(move_index = slot, "Building without embedding for move");
                }
                vectors[slot] = vector;
            }
        }

        let mut moves = moves;
        for (m, v) in moves.iter_mut().zip(&vectors) {
            if m.embedding.is_none() {
                m.embedding = v.as_ref().map(|v| v.as_ref().clone());
            }
        }
        let plain: Vec<Option<&[f32]>> = vectors
            .iter()
            .map(|v| v.as_deref().map(|v| v.as_slice()))
            .collect();
        Ok(self.build_with_embeddings(moves, &plain))
    }

    /// Build from precomputed embeddings (`None` = unavailable). Pure.
    pub fn build_with_embeddings(
        &self,
        moves: Vec<Move>,
        embeddings: &[Option<&[f32]>],
    ) -> Linkograph {
        let mut graph = Linkograph::empty(self.params.clone());
        let mut degrees: Vec<usize> = Vec::with_capacity(moves.len());

        for (position, mut m) in moves.into_iter().enumerate() {
            m.index = position;
            let embedding = embeddings.get(position).copied().flatten();
            if m.embedding.is_none() {
                m.embedding = embedding.map(<[f32]>::to_vec);
            }
            let new_links = self.links_into(&degrees, position, embedding, |k| {
                embeddings.get(k).copied().flatten()
            });
            graph.moves.push(m);
            degrees.push(0);
            for link in &new_links {
                degrees[link.source] += 1;
                degrees[link.target] += 1;
            }
            graph.links.extend(new_links);
        }

        graph.links.sort_by(|a, b| (a.source, a.target).cmp(&(b.source, b.target)));
        graph.metrics = LinkographMetrics::compute(&graph.moves, &graph.links, &self.params);
        debug!(
            moves = graph.moves.len(),
            links = graph.links.len(),
            "Linkograph built"
        );
        graph
    }

    /// Append one move, examining only pairs `(k, new)` within range, then
    /// recompute the derived metrics.
    pub fn append(&self, graph: &mut Linkograph, mut new_move: Move, embedding: Option<&[f32]>) {
        let position = graph.moves.len();
        new_move.index = position;
        if new_move.embedding.is_none() {
            new_move.embedding = embedding.map(<[f32]>::to_vec);
        }

        // Degrees over links among existing moves, i.e. targets < position.
        let degrees: Vec<usize> = (0..position).map(|i| graph.metrics.degree(i)).collect();
        let existing = &graph.moves;
        let new_links = self.links_into(&degrees, position, embedding, |k| {
            existing.get(k).and_then(|m| m.embedding.as_deref())
        });

        graph.moves.push(new_move);
        graph.links.extend(new_links);
        graph
            .links
            .sort_by(|a, b| (a.source, a.target).cmp(&(b.source, b.target)));
        graph.metrics = LinkographMetrics::compute(&graph.moves, &graph.links, &self.params);
    }

    /// Links from earlier moves into move `target`, in ascending source order.
    fn links_into<'a, F>(
        &self,
        degrees: &[usize],
        target: usize,
        target_embedding: Option<&[f32]>,
        embedding_of: F,
    ) -> Vec<Link>
    where
        F: Fn(usize) -> Option<&'a [f32]>,
    {
        let Some(target_vec) = target_embedding else {
            return Vec::new();
        };
        let start = target.saturating_sub(self.params.max_link_range);
        let tau = self.params.tau();

        (start..target)
            .filter_map(|source| {
                let source_vec = embedding_of(source)?;
                let raw = cosine(source_vec, target_vec);
                let strength = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
                if strength < self.params.similarity_threshold {
                    return None;
                }
                let gap = target - source;
                let kind = if gap <= self.params.lateral_window
                    && strength >= self.params.lateral_strong
                {
                    LinkKind::Lateral
                } else if degrees.get(source).copied().unwrap_or(0)
                    >= self.params.critical_threshold
                {
                    LinkKind::Backward
                } else {
                    LinkKind::Forward
                };
                let confidence = if tau > 0.0 {
                    strength * (-((gap - 1) as f64) / tau).exp()
                } else {
                    strength
                };
                Some(Link {
                    source,
                    target,
                    strength,
                    confidence,
                    kind,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkography::types::{Author, DesignPhase};

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot % dim] = 1.0;
        v
    }

    fn moves(n: usize) -> Vec<Move> {
        (0..n)
            .map(|i| Move::new(i, Author::Student, format!("move {}", i), DesignPhase::Ideation))
            .collect()
    }

    fn build(vectors: &[Vec<f32>], params: LinkographParams) -> Linkograph {
        let refs: Vec<Option<&[f32]>> = vectors.iter().map(|v| Some(v.as_slice())).collect();
        LinkographBuilder::new(params).build_with_embeddings(moves(vectors.len()), &refs)
    }

    #[test]
    fn test_empty_and_single() {
        let empty = build(&[], LinkographParams::default());
        assert!(empty.links.is_empty());
        assert_eq!(empty.metrics.link_density, 0.0);

        let single = build(&[unit(4, 0)], LinkographParams::default());
        assert!(single.links.is_empty());
        assert_eq!(single.metrics.orphan_ratio, 1.0);
    }

    #[test]
    fn test_identical_moves_link_with_full_strength() {
        let vectors = vec![unit(4, 1); 4];
        let graph = build(&vectors, LinkographParams::default());
        assert_eq!(graph.links.len(), 6);
        assert!(graph.links.iter().all(|l| l.strength == 1.0));
        assert_eq!(graph.metrics.link_density, 1.5);
    }

    #[test]
    fn test_range_limit() {
        let params = LinkographParams {
            max_link_range: 2,
            ..LinkographParams::default()
        };
        let graph = build(&vec![unit(4, 1); 5], params);
        assert!(graph.links.iter().all(|l| l.range() <= 2));
        assert_eq!(graph.links.len(), 7);
    }

    #[test]
    fn test_links_sorted_by_source_then_target() {
        let graph = build(&vec![unit(4, 2); 5], LinkographParams::default());
        let pairs: Vec<(usize, usize)> = graph.links.iter().map(|l| (l.source, l.target)).collect();
        let mut sorted = pairs.clone();
        sorted.sort();
        assert_eq!(pairs, sorted);
    }

    #[test]
    fn test_unrelated_moves_do_not_link() {
        let vectors: Vec<Vec<f32>> = (0..4).map(|i| unit(8, i)).collect();
        let graph = build(&vectors, LinkographParams::default());
        assert!(graph.links.is_empty());
        assert_eq!(graph.metrics.orphan_ratio, 1.0);
    }

    #[test]
    fn test_link_kinds() {
        let params = LinkographParams {
            critical_threshold: 2,
            ..LinkographParams::default()
        };
        let graph = build(&vec![unit(4, 0); 5], params);
        // Adjacent identical moves are lateral.
        assert_eq!(graph.link(0, 1).unwrap().kind, LinkKind::Lateral);
        // (0,3): source 0 already has links to 1 and 2 -> backward.
        assert_eq!(graph.link(0, 3).unwrap().kind, LinkKind::Backward);
        // (0,3) with no critical source would be forward: check a fresh graph.
        let sparse = build(&vec![unit(4, 0); 4], LinkographParams::default());
        assert_eq!(sparse.link(0, 3).unwrap().kind, LinkKind::Forward);
    }

    #[test]
    fn test_confidence_decays_with_distance() {
        let graph = build(&vec![unit(4, 0); 4], LinkographParams::default());
        let near = graph.link(0, 1).unwrap().confidence;
        let far = graph.link(0, 3).unwrap().confidence;
        assert_eq!(near, 1.0);
        let tau = LinkographParams::default().tau();
        assert!((far - (-2.0 / tau).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_missing_embedding_omits_links() {
        let v = unit(4, 0);
        let refs: Vec<Option<&[f32]>> = vec![Some(v.as_slice()), None, Some(v.as_slice())];
        let graph = LinkographBuilder::default().build_with_embeddings(moves(3), &refs);
        assert_eq!(graph.links.len(), 1);
        assert!(graph.has_link(0, 2));
    }

    #[test]
    fn test_incremental_matches_batch() {
        let params = LinkographParams {
            critical_threshold: 2,
            max_link_range: 3,
            ..LinkographParams::default()
        };
        let vectors: Vec<Vec<f32>> = (0..8)
            .map(|i| if i % 3 == 0 { unit(4, 0) } else { vec![0.6, 0.8, 0.0, 0.0] })
            .collect();
        let batch = build(&vectors, params.clone());

        let builder = LinkographBuilder::new(params.clone());
        let mut incremental = Linkograph::empty(params);
        for (i, m) in moves(vectors.len()).into_iter().enumerate() {
            builder.append(&mut incremental, m, Some(&vectors[i]));
        }

        assert_eq!(batch.links, incremental.links);
        assert_eq!(batch.metrics, incremental.metrics);
    }
}
