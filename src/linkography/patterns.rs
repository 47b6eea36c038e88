use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

use super::types::{LinkKind, Linkograph, LinkographParams};

/// Minimum run/chain/web sizes.
const MIN_ORPHAN_RUN: usize = 3;
const MIN_SAWTOOTH_LINKS: usize = 3;
const MIN_WEB_SIZE: usize = 5;
const MIN_WEB_AVG_DEGREE: f64 = 3.0;
const MAX_WEB_DIAMETER: usize = 3;
const MIN_ABORTED_CHAINS: usize = 2;
const BREAKTHROUGH_WINDOW: usize = 3;
const BREAKTHROUGH_RATIO: f64 = 2.0;

/// Structural pattern kinds, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Densely interlinked consecutive moves.
    Chunk,
    /// Highly interconnected, compact node set.
    Web,
    /// Chain of adjacent links moving steadily forward.
    Sawtooth,
    /// Run of moves with no links at all.
    OrphanSequence,
    /// Sudden jump in local link density.
    Breakthrough,
    /// Orphan run surrounded by abandoned one-link chains.
    Struggle,
}

impl PatternKind {
    /// All kinds in reporting order.
    pub const ALL: [PatternKind; 6] = [
        PatternKind::Chunk,
        PatternKind::Web,
        PatternKind::Sawtooth,
        PatternKind::OrphanSequence,
        PatternKind::Breakthrough,
        PatternKind::Struggle,
    ];

    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Chunk => "chunk",
            PatternKind::Web => "web",
            PatternKind::Sawtooth => "sawtooth",
            PatternKind::OrphanSequence => "orphan_sequence",
            PatternKind::Breakthrough => "breakthrough",
            PatternKind::Struggle => "struggle",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PatternKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chunk" => Ok(PatternKind::Chunk),
            "web" => Ok(PatternKind::Web),
            "sawtooth" => Ok(PatternKind::Sawtooth),
            "orphan_sequence" | "orphan" => Ok(PatternKind::OrphanSequence),
            "breakthrough" => Ok(PatternKind::Breakthrough),
            "struggle" => Ok(PatternKind::Struggle),
            _ => Err(format!("Unknown pattern kind: {}", s)),
        }
    }
}

/// A detected pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    /// Move indices, ascending.
    pub indices: Vec<usize>,
    /// In [0, 1].
    pub strength: f64,
    pub description: String,
}

impl Pattern {
    fn new(kind: PatternKind, indices: Vec<usize>, strength: f64, description: String) -> Self {
        let strength = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            kind,
            indices,
            strength,
            description,
        }
    }

    /// Earliest move index covered by the pattern.
    pub fn earliest(&self) -> usize {
        self.indices.first().copied().unwrap_or(0)
    }

    /// Whether the pattern covers a move.
    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }
}

/// Number of patterns of one kind.
pub fn count_kind(patterns: &[Pattern], kind: PatternKind) -> usize {
    patterns.iter().filter(|p| p.kind == kind).count()
}

/// Finds structural patterns over a linkograph. Pure and deterministic.
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    params: LinkographParams,
}

impl PatternDetector {
    /// Create a detector with explicit parameters
    pub fn new(params: LinkographParams) -> Self {
        Self { params }
    }

    /// Detector using the parameters a linkograph was built with.
    pub fn for_graph(graph: &Linkograph) -> Self {
        Self::new(graph.params().clone())
    }

    /// Run every detector; results ordered by kind then earliest index.
    pub fn detect(&self, graph: &Linkograph) -> Vec<Pattern> {
        if graph.is_empty() {
            return Vec::new();
        }

        let mut patterns = Vec::new();
        patterns.extend(self.chunks(graph));
        patterns.extend(self.webs(graph));
        patterns.extend(self.sawtooths(graph));
        patterns.extend(self.orphan_sequences(graph));
        patterns.extend(self.breakthroughs(graph));
        patterns.extend(self.struggles(graph));
        patterns.sort_by(|a, b| (a.kind, a.earliest()).cmp(&(b.kind, b.earliest())));

        debug!(
            moves = graph.len(),
            patterns = patterns.len(),
            "Pattern detection complete"
        );
        patterns
    }

    /// Chunk patterns: maximal regions of qualifying sliding windows.
    pub fn chunks(&self, graph: &Linkograph) -> Vec<Pattern> {
        let n = graph.len();
        let w = self.params.chunk_window;
        if w < 2 || n < w {
            return Vec::new();
        }

        let qualifying: Vec<usize> = (0..=n - w)
            .filter(|&s| self.region_density(graph, s, s + w - 1) >= self.params.chunk_density)
            .collect();

        let mut patterns = Vec::new();
        let mut group: Vec<usize> = Vec::new();
        for start in qualifying {
            if let Some(&last) = group.last() {
                if start > last + w - 1 {
                    patterns.push(self.chunk_from_group(graph, &group));
                    group.clear();
                }
            }
            group.push(start);
        }
        if !group.is_empty() {
            patterns.push(self.chunk_from_group(graph, &group));
        }
        patterns
    }

    fn chunk_from_group(&self, graph: &Linkograph, starts: &[usize]) -> Pattern {
        let w = self.params.chunk_window;
        let mut lo = starts[0];
        let mut hi = starts[starts.len() - 1] + w - 1;

        // Trim boundary moves with no link inside the region.
        while lo < hi && !self.linked_within(graph, lo, lo, hi) {
            lo += 1;
        }
        while hi > lo && !self.linked_within(graph, hi, lo, hi) {
            hi -= 1;
        }

        let trimmed = self.region_density(graph, lo, hi);
        let (lo, hi, density) = if hi > lo && trimmed >= self.params.chunk_density {
            (lo, hi, trimmed)
        } else {
            let mut best = (starts[0], self.region_density(graph, starts[0], starts[0] + w - 1));
            for &s in &starts[1..] {
                let d = self.region_density(graph, s, s + w - 1);
                if d > best.1 {
                    best = (s, d);
                }
            }
            (best.0, best.0 + w - 1, best.1)
        };

        Pattern::new(
            PatternKind::Chunk,
            (lo..=hi).collect(),
            density,
            format!("Chunk over moves {}-{} (density {:.2})", lo, hi, density),
        )
    }

    /// Links fully inside [lo, hi] over the pairs a link could exist for.
    fn region_density(&self, graph: &Linkograph, lo: usize, hi: usize) -> f64 {
        if hi <= lo {
            return 0.0;
        }
        let len = hi - lo + 1;
        let max_gap = (len - 1).min(self.params.max_link_range);
        let eligible: usize = (1..=max_gap).map(|gap| len - gap).sum();
        if eligible == 0 {
            return 0.0;
        }
        internal_links(graph, lo, hi) as f64 / eligible as f64
    }

    fn linked_within(&self, graph: &Linkograph, index: usize, lo: usize, hi: usize) -> bool {
        graph.links.iter().any(|l| {
            l.touches(index) && l.source >= lo && l.target <= hi && l.source != l.target
        })
    }

    /// Web patterns: compact, highly connected neighbourhoods.
    pub fn webs(&self, graph: &Linkograph) -> Vec<Pattern> {
        let adj = graph.adjacency();
        let mut candidates: Vec<(BTreeSet<usize>, f64)> = Vec::new();

        for (v, neighbours) in adj.iter().enumerate() {
            if neighbours.len() < 3 {
                continue;
            }
            let mut set: BTreeSet<usize> = neighbours.iter().copied().collect();
            set.insert(v);

            loop {
                let weak: Vec<usize> = set
                    .iter()
                    .copied()
                    .filter(|&u| induced_degree(&adj, &set, u) < 2)
                    .collect();
                if weak.is_empty() {
                    break;
                }
                for u in weak {
                    set.remove(&u);
                }
            }

            if set.len() < MIN_WEB_SIZE {
                continue;
            }
            let degree_sum: usize = set.iter().map(|&u| induced_degree(&adj, &set, u)).sum();
            let avg = degree_sum as f64 / set.len() as f64;
            if avg < MIN_WEB_AVG_DEGREE {
                continue;
            }
            match induced_diameter(&adj, &set) {
                Some(d) if d <= MAX_WEB_DIAMETER => candidates.push((set, avg)),
                _ => {}
            }
        }

        // Largest first so contained candidates are dropped.
        candidates.sort_by(|a, b| {
            b.0.len()
                .cmp(&a.0.len())
                .then_with(|| a.0.iter().next().cmp(&b.0.iter().next()))
        });
        let mut accepted: Vec<(BTreeSet<usize>, f64)> = Vec::new();
        for (set, avg) in candidates {
            if accepted.iter().any(|(kept, _)| set.is_subset(kept)) {
                continue;
            }
            accepted.push((set, avg));
        }

        let mut patterns: Vec<Pattern> = accepted
            .into_iter()
            .map(|(set, avg)| {
                let indices: Vec<usize> = set.into_iter().collect();
                let description = format!(
                    "Web of {} moves (average degree {:.2})",
                    indices.len(),
                    avg
                );
                Pattern::new(PatternKind::Web, indices, avg / 5.0, description)
            })
            .collect();
        patterns.sort_by_key(|p| p.earliest());
        patterns
    }

    /// Sawtooth patterns: runs of adjacent, non-backward links.
    pub fn sawtooths(&self, graph: &Linkograph) -> Vec<Pattern> {
        let n = graph.len();
        let mut patterns = Vec::new();
        let mut run_start: Option<usize> = None;
        let mut run_len = 0usize;

        for k in 0..n.saturating_sub(1) {
            let step = graph
                .link(k, k + 1)
                .map(|l| l.kind != LinkKind::Backward)
                .unwrap_or(false);
            if step {
                if run_start.is_none() {
                    run_start = Some(k);
                }
                run_len += 1;
            } else {
                if let Some(start) = run_start.take() {
                    self.push_sawtooth(&mut patterns, start, run_len);
                }
                run_len = 0;
            }
        }
        if let Some(start) = run_start {
            self.push_sawtooth(&mut patterns, start, run_len);
        }
        patterns
    }

    fn push_sawtooth(&self, patterns: &mut Vec<Pattern>, start: usize, links: usize) {
        if links < MIN_SAWTOOTH_LINKS {
            return;
        }
        patterns.push(Pattern::new(
            PatternKind::Sawtooth,
            (start..=start + links).collect(),
            links as f64 / 6.0,
            format!("Sawtooth chain of {} links from move {}", links, start),
        ));
    }

    /// Orphan sequences: runs of unlinked moves.
    pub fn orphan_sequences(&self, graph: &Linkograph) -> Vec<Pattern> {
        orphan_runs(graph)
            .into_iter()
            .map(|(start, end)| {
                let run = end - start + 1;
                Pattern::new(
                    PatternKind::OrphanSequence,
                    (start..=end).collect(),
                    run as f64 / 5.0,
                    format!("{} consecutive unlinked moves from move {}", run, start),
                )
            })
            .collect()
    }

    /// Breakthroughs: local density jumps.
    pub fn breakthroughs(&self, graph: &Linkograph) -> Vec<Pattern> {
        let n = graph.len();
        let w = BREAKTHROUGH_WINDOW;
        if n < 2 * w {
            return Vec::new();
        }
        let density = |start: usize| internal_links(graph, start, start + w - 1) as f64 / w as f64;

        // (anchor, trailing density, prior density)
        let qualifying: Vec<(usize, f64, f64)> = (w..=n - w)
            .filter_map(|m| {
                let trailing = density(m);
                let prior = density(m - w);
                let jump = if prior == 0.0 {
                    trailing > 0.0
                } else {
                    trailing >= BREAKTHROUGH_RATIO * prior
                };
                jump.then_some((m, trailing, prior))
            })
            .collect();

        let mut patterns = Vec::new();
        let mut i = 0;
        while i < qualifying.len() {
            let mut best = qualifying[i];
            let mut j = i + 1;
            while j < qualifying.len() && qualifying[j].0 == qualifying[j - 1].0 + 1 {
                if qualifying[j].1 > best.1 {
                    best = qualifying[j];
                }
                j += 1;
            }
            let (anchor, trailing, prior) = best;
            let strength = if prior == 0.0 {
                1.0
            } else {
                (trailing / prior - 1.0).min(1.0)
            };
            patterns.push(Pattern::new(
                PatternKind::Breakthrough,
                (anchor..anchor + w).collect(),
                strength,
                format!(
                    "Link density rises from {:.2} to {:.2} at move {}",
                    prior, trailing, anchor
                ),
            ));
            i = j;
        }
        patterns
    }

    /// Struggles: orphan runs flanked by abandoned single-link chains.
    pub fn struggles(&self, graph: &Linkograph) -> Vec<Pattern> {
        let metrics = &graph.metrics;
        let aborted: Vec<(usize, usize)> = graph
            .links
            .iter()
            .filter(|l| metrics.degree(l.source) == 1 && metrics.degree(l.target) == 1)
            .map(|l| (l.source, l.target))
            .collect();
        let reach = self.params.lateral_window;

        orphan_runs(graph)
            .into_iter()
            .filter_map(|(start, end)| {
                let lo = start.saturating_sub(reach);
                let hi = end + reach;
                let touching: Vec<(usize, usize)> = aborted
                    .iter()
                    .copied()
                    .filter(|&(s, t)| s <= hi && t >= lo)
                    .collect();
                if touching.len() < MIN_ABORTED_CHAINS {
                    return None;
                }
                let mut indices: BTreeSet<usize> = (start..=end).collect();
                for (s, t) in &touching {
                    indices.insert(*s);
                    indices.insert(*t);
                }
                let run = end - start + 1;
                Some(Pattern::new(
                    PatternKind::Struggle,
                    indices.into_iter().collect(),
                    run as f64 / 5.0,
                    format!(
                        "{} unlinked moves from move {} with {} abandoned chains",
                        run,
                        start,
                        touching.len()
                    ),
                ))
            })
            .collect()
    }
}

fn internal_links(graph: &Linkograph, lo: usize, hi: usize) -> usize {
    graph
        .links
        .iter()
        .filter(|l| l.source >= lo && l.target <= hi)
        .count()
}

/// Maximal runs (inclusive) of at least three moves with no incident link.
fn orphan_runs(graph: &Linkograph) -> Vec<(usize, usize)> {
    let n = graph.len();
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for i in 0..=n {
        let orphan = i < n && graph.metrics.degree(i) == 0;
        match (orphan, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= MIN_ORPHAN_RUN {
                    runs.push((s, i - 1));
                }
                start = None;
            }
            _ => {}
        }
    }
    runs
}

fn induced_degree(adj: &[Vec<usize>], set: &BTreeSet<usize>, node: usize) -> usize {
    adj[node].iter().filter(|u| set.contains(u)).count()
}

/// Diameter of the induced subgraph, `None` when disconnected.
fn induced_diameter(adj: &[Vec<usize>], set: &BTreeSet<usize>) -> Option<usize> {
    let mut diameter = 0;
    for &root in set {
        let mut dist = std::collections::HashMap::new();
        dist.insert(root, 0usize);
        let mut queue = VecDeque::from([root]);
        while let Some(u) = queue.pop_front() {
            let d = dist[&u];
            for &v in &adj[u] {
                if set.contains(&v) && !dist.contains_key(&v) {
                    dist.insert(v, d + 1);
                    queue.push_back(v);
                }
            }
        }
        if dist.len() != set.len() {
            return None;
        }
        diameter = diameter.max(dist.values().copied().max().unwrap_or(0));
    }
    Some(diameter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linkography::builder::LinkographBuilder;
    use crate::linkography::types::{Author, DesignPhase, Move};

    fn axis(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    /// Moves sharing a group id embed identically; distinct groups are orthogonal.
    fn graph_from_groups(groups: &[usize]) -> Linkograph {
        let dim = groups.iter().copied().max().unwrap_or(0) + 1;
        let vectors: Vec<Vec<f32>> = groups.iter().map(|&g| axis(dim, g)).collect();
        let refs: Vec<Option<&[f32]>> = vectors.iter().map(|v| Some(v.as_slice())).collect();
        let moves: Vec<Move> = (0..groups.len())
            .map(|i| Move::new(i, Author::Student, format!("m{}", i), DesignPhase::Ideation))
            .collect();
        LinkographBuilder::default().build_with_embeddings(moves, &refs)
    }

    #[test]
    fn test_empty_graph_has_no_patterns() {
        let graph = Linkograph::empty(LinkographParams::default());
        assert!(PatternDetector::for_graph(&graph).detect(&graph).is_empty());
    }

    #[test]
    fn test_single_move_has_no_patterns() {
        let graph = graph_from_groups(&[0]);
        assert!(PatternDetector::for_graph(&graph).detect(&graph).is_empty());
    }

    #[test]
    fn test_chunk_on_similar_prefix() {
        let graph = graph_from_groups(&[0, 0, 0, 0, 0, 1, 2, 3, 4, 5]);
        let chunks = PatternDetector::for_graph(&graph).chunks(&graph);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(chunks[0].strength, 1.0);
    }

    #[test]
    fn test_web_on_clique() {
        let graph = graph_from_groups(&[0, 0, 0, 0, 0, 0]);
        let webs = PatternDetector::for_graph(&graph).webs(&graph);
        assert_eq!(webs.len(), 1);
        assert_eq!(webs[0].indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(webs[0].strength, 1.0);
    }

    #[test]
    fn test_no_web_below_five_moves() {
        let graph = graph_from_groups(&[0, 0, 0, 0]);
        assert!(PatternDetector::for_graph(&graph).webs(&graph).is_empty());
    }

    #[test]
    fn test_sawtooth_chain() {
        // 0-1, 1-2, 2-3, 3-4 linked by overlapping pairs of dimensions.
        let vectors: Vec<Vec<f32>> = vec![
            vec![1.0, 0.0, 0.0, 0.0, 0.0],
            vec![1.0, 1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0, 1.0],
        ];
        let refs: Vec<Option<&[f32]>> = vectors.iter().map(|v| Some(v.as_slice())).collect();
        let moves: Vec<Move> = (0..5)
            .map(|i| Move::new(i, Author::Student, "x", DesignPhase::Ideation))
            .collect();
        let graph = LinkographBuilder::default().build_with_embeddings(moves, &refs);
        let saws = PatternDetector::for_graph(&graph).sawtooths(&graph);
        assert_eq!(saws.len(), 1);
        assert_eq!(saws[0].indices, vec![0, 1, 2, 3, 4]);
        assert!((saws[0].strength - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_orphan_sequence() {
        let graph = graph_from_groups(&[0, 0, 1, 2, 3, 4, 5, 5]);
        let orphans = PatternDetector::for_graph(&graph).orphan_sequences(&graph);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].indices, vec![2, 3, 4, 5]);
        assert!((orphans[0].strength - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_breakthrough_anchor() {
        let graph = graph_from_groups(&[0, 0, 1, 2, 2, 3, 4, 4, 5, 6, 6, 6]);
        let found = PatternDetector::for_graph(&graph).breakthroughs(&graph);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].earliest(), 9);
        assert_eq!(found[0].strength, 1.0);
    }

    #[test]
    fn test_struggle() {
        // Two isolated pairs around an orphan run of three.
        let graph = graph_from_groups(&[0, 0, 1, 2, 3, 4, 4]);
        let detector = PatternDetector::for_graph(&graph);
        let struggles = detector.struggles(&graph);
        assert_eq!(struggles.len(), 1);
        assert_eq!(struggles[0].indices, vec![0, 1, 2, 3, 4, 5, 6]);
        assert!((struggles[0].strength - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_detect_orders_by_kind_then_index() {
        let graph = graph_from_groups(&[0, 0, 0, 0, 0, 1, 2, 3, 4, 5]);
        let patterns = PatternDetector::for_graph(&graph).detect(&graph);
        let kinds: Vec<PatternKind> = patterns.iter().map(|p| p.kind).collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
        assert!(patterns.iter().all(|p| (0.0..=1.0).contains(&p.strength)));
    }

    #[test]
    fn test_pattern_kind_round_trip_names() {
        for kind in PatternKind::ALL {
            assert_eq!(kind.as_str().parse::<PatternKind>().unwrap(), kind);
        }
    }
}
