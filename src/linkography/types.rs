use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::LinkographyConfig;
use crate::text::{contains_any, word_count};

/// Who produced a design move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    /// The learner.
    Student,
    /// The tutor (any arm).
    Tutor,
}

impl Author {
    /// Get the author name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Author::Student => "student",
            Author::Tutor => "tutor",
        }
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Author {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Author::Student),
            "tutor" => Ok(Author::Tutor),
            _ => Err(format!("Unknown author: {}", s)),
        }
    }
}

/// Design phase. Ordered: a session only ever moves forward through it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DesignPhase {
    /// Generating ideas and framing the problem.
    #[default]
    Ideation,
    /// Drawing, modelling and spatial exploration.
    Visualisation,
    /// Materials, structure and construction.
    Materialisation,
}

impl DesignPhase {
    /// All phases in order.
    pub const ALL: [DesignPhase; 3] = [
        DesignPhase::Ideation,
        DesignPhase::Visualisation,
        DesignPhase::Materialisation,
    ];

    /// Get the phase name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            DesignPhase::Ideation => "ideation",
            DesignPhase::Visualisation => "visualisation",
            DesignPhase::Materialisation => "materialisation",
        }
    }

    /// The phase after this one, if any.
    pub fn next(&self) -> Option<DesignPhase> {
        match self {
            DesignPhase::Ideation => Some(DesignPhase::Visualisation),
            DesignPhase::Visualisation => Some(DesignPhase::Materialisation),
            DesignPhase::Materialisation => None,
        }
    }
}

impl std::fmt::Display for DesignPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DesignPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ideation" => Ok(DesignPhase::Ideation),
            "visualisation" | "visualization" => Ok(DesignPhase::Visualisation),
            "materialisation" | "materialization" => Ok(DesignPhase::Materialisation),
            _ => Err(format!("Unknown design phase: {}", s)),
        }
    }
}

/// Cognitive character of a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    /// Breaking the problem down.
    #[default]
    Analysis,
    /// Combining ideas into something new.
    Synthesis,
    /// Judging options against criteria.
    Evaluation,
    /// Changing or reframing an earlier idea.
    Transformation,
    /// Thinking about one's own process.
    Reflection,
}

const REFLECTION_MARKERS: &[&str] = &[
    "i think my",
    "i realize",
    "i realise",
    "i learned",
    "i've learned",
    "reflect*",
    "looking back",
    "my process",
    "my approach",
    "i was wrong",
    "i noticed that i",
    "i'm struggling",
    "i am struggling",
];
const EVALUATION_MARKERS: &[&str] = &[
    "better",
    "worse",
    "evaluat*",
    "compar*",
    "trade-off",
    "tradeoff",
    "pros and cons",
    "works well",
    "doesn't work",
    "does not work",
    "criteria",
];
const SYNTHESIS_MARKERS: &[&str] = &[
    "combin*",
    "integrat*",
    "bring together",
    "merg*",
    "together with",
    "unify",
    "synthes*",
];
const TRANSFORMATION_MARKERS: &[&str] = &[
    "instead",
    "chang*",
    "modif*",
    "rotat*",
    "shift*",
    "transform*",
    "rethink*",
    "revis*",
    "replac*",
];

impl MoveType {
    /// Get the move type name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveType::Analysis => "analysis",
            MoveType::Synthesis => "synthesis",
            MoveType::Evaluation => "evaluation",
            MoveType::Transformation => "transformation",
            MoveType::Reflection => "reflection",
        }
    }

    /// Keyword classification of an utterance. Reflection wins over the
    /// others because it is the rarest and the one the metrics reward.
    pub fn classify(text: &str) -> MoveType {
        if contains_any(text, REFLECTION_MARKERS) {
            MoveType::Reflection
        } else if contains_any(text, EVALUATION_MARKERS) {
            MoveType::Evaluation
        } else if contains_any(text, SYNTHESIS_MARKERS) {
            MoveType::Synthesis
        } else if contains_any(text, TRANSFORMATION_MARKERS) {
            MoveType::Transformation
        } else {
            MoveType::Analysis
        }
    }
}

impl std::fmt::Display for MoveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MoveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analysis" => Ok(MoveType::Analysis),
            "synthesis" => Ok(MoveType::Synthesis),
            "evaluation" => Ok(MoveType::Evaluation),
            "transformation" => Ok(MoveType::Transformation),
            "reflection" => Ok(MoveType::Reflection),
            _ => Err(format!("Unknown move type: {}", s)),
        }
    }
}

/// One design utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Move {
    /// Stable identifier.
    pub id: String,
    /// Dense, 0-based position in the session.
    pub index: usize,
    /// When the move was made.
    pub timestamp: DateTime<Utc>,
    /// Who made the move.
    pub author: Author,
    /// The utterance.
    pub text: String,
    /// Design phase at the time of the move.
    pub phase: DesignPhase,
    /// Cognitive character of the move.
    pub move_type: MoveType,
    /// Lazily computed semantic vector; never serialised.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Move {
    /// Create a move, classifying its type from the text.
    pub fn new(index: usize, author: Author, text: impl Into<String>, phase: DesignPhase) -> Self {
        let text = text.into();
        Self {
            id: Uuid::new_v4().to_string(),
            index,
            timestamp: Utc::now(),
            author,
            move_type: MoveType::classify(&text),
            text,
            phase,
            embedding: None,
        }
    }

    /// Override the classified move type
    pub fn with_type(mut self, move_type: MoveType) -> Self {
        self.move_type = move_type;
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set a stable id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Word count of the utterance.
    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

/// Direction/character of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// A new idea building on an earlier, not yet critical move.
    Forward,
    /// A move returning to an already critical earlier move.
    Backward,
    /// A strong link between near neighbours.
    Lateral,
}

impl LinkKind {
    /// Get the link kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Forward => "forward",
            LinkKind::Backward => "backward",
            LinkKind::Lateral => "lateral",
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Directed semantic link between two moves, `source < target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: usize,
    pub target: usize,
    /// Cosine similarity, clamped to [0, 1].
    pub strength: f64,
    /// Strength discounted by distance.
    pub confidence: f64,
    pub kind: LinkKind,
}

impl Link {
    /// Distance between the linked moves.
    pub fn range(&self) -> usize {
        self.target - self.source
    }

    /// Whether the link touches the given move.
    pub fn touches(&self, index: usize) -> bool {
        self.source == index || self.target == index
    }
}

/// Parameters of linkograph construction, a view of [`LinkographyConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinkographParams {
    pub similarity_threshold: f64,
    pub max_link_range: usize,
    pub lateral_window: usize,
    pub lateral_strong: f64,
    pub critical_threshold: usize,
    pub chunk_window: usize,
    pub chunk_density: f64,
}

impl Default for LinkographParams {
    fn default() -> Self {
        Self::from(&LinkographyConfig::default())
    }
}

impl From<&LinkographyConfig> for LinkographParams {
    fn from(config: &LinkographyConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            max_link_range: config.max_link_range,
            lateral_window: config.lateral_window,
            lateral_strong: config.lateral_strong,
            critical_threshold: config.critical_threshold,
            chunk_window: config.chunk_window,
            chunk_density: config.chunk_density,
        }
    }
}

impl LinkographParams {
    /// Decay constant of link confidence.
    pub fn tau(&self) -> f64 {
        self.max_link_range as f64 / 2.0
    }
}

/// Metrics derived purely from (moves, links).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkographMetrics {
    pub move_count: usize,
    pub link_count: usize,
    /// links / moves
    pub link_density: f64,
    /// Fraction of moves with at least `critical_threshold` incident links.
    pub critical_move_ratio: f64,
    /// Fraction of moves with no incident link.
    pub orphan_ratio: f64,
    /// Mean of `target - source` over links.
    pub average_link_range: f64,
    pub phase_distribution: BTreeMap<DesignPhase, usize>,
    /// Indices of critical moves, ascending.
    pub critical_moves: Vec<usize>,
    /// Links leaving each move towards later moves.
    pub forelinks: Vec<usize>,
    /// Links arriving at each move from earlier moves.
    pub backlinks: Vec<usize>,
}

impl LinkographMetrics {
    /// Compute the derived metrics. O(|moves| + |links|).
    pub fn compute(moves: &[Move], links: &[Link], params: &LinkographParams) -> Self {
        let n = moves.len();
        let mut phase_distribution = BTreeMap::new();
        for m in moves {
            *phase_distribution.entry(m.phase).or_insert(0) += 1;
        }
        if n == 0 {
            return Self {
                phase_distribution,
                ..Self::default()
            };
        }

        let mut forelinks = vec![0usize; n];
        let mut backlinks = vec![0usize; n];
        let mut range_sum = 0usize;
        for link in links {
            if link.source < n && link.target < n {
                forelinks[link.source] += 1;
                backlinks[link.target] += 1;
                range_sum += link.range();
            }
        }

        let critical_moves: Vec<usize> = (0..n)
            .filter(|&i| forelinks[i] + backlinks[i] >= params.critical_threshold)
            .collect();
        let orphans = (0..n)
            .filter(|&i| forelinks[i] + backlinks[i] == 0)
            .count();

        Self {
            move_count: n,
            link_count: links.len(),
            link_density: links.len() as f64 / n as f64,
            critical_move_ratio: critical_moves.len() as f64 / n as f64,
            orphan_ratio: orphans as f64 / n as f64,
            average_link_range: if links.is_empty() {
                0.0
            } else {
                range_sum as f64 / links.len() as f64
            },
            phase_distribution,
            critical_moves,
            forelinks,
            backlinks,
        }
    }

    /// Incident link count of a move.
    pub fn degree(&self, index: usize) -> usize {
        self.forelinks.get(index).copied().unwrap_or(0)
            + self.backlinks.get(index).copied().unwrap_or(0)
    }
}

/// A session's moves, links and derived metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linkograph {
    pub moves: Vec<Move>,
    /// Sorted by (source, target) ascending.
    pub links: Vec<Link>,
    pub metrics: LinkographMetrics,
    #[serde(skip, default)]
    pub(crate) params: LinkographParams,
}

impl Linkograph {
    /// An empty linkograph with all metrics zero.
    pub fn empty(params: LinkographParams) -> Self {
        Self {
            moves: Vec::new(),
            links: Vec::new(),
            metrics: LinkographMetrics::default(),
            params,
        }
    }

    /// Parameters the linkograph was built with.
    pub fn params(&self) -> &LinkographParams {
        &self.params
    }

    /// Number of moves.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Whether there are no moves.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Whether a link exists between two moves (either order).
    pub fn has_link(&self, a: usize, b: usize) -> bool {
        let (source, target) = if a < b { (a, b) } else { (b, a) };
        self.links
            .binary_search_by(|l| (l.source, l.target).cmp(&(source, target)))
            .is_ok()
    }

    /// Link between two moves, if any.
    pub fn link(&self, a: usize, b: usize) -> Option<&Link> {
        let (source, target) = if a < b { (a, b) } else { (b, a) };
        self.links
            .binary_search_by(|l| (l.source, l.target).cmp(&(source, target)))
            .ok()
            .map(|i| &self.links[i])
    }

    /// Undirected adjacency lists.
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.moves.len()];
        for link in &self.links {
            adj[link.source].push(link.target);
            adj[link.target].push(link.source);
        }
        adj
    }

    /// The linkograph restricted to one phase, re-indexed from zero. Links
    /// keep their strength, confidence and kind.
    pub fn phase_subgraph(&self, phase: DesignPhase) -> Linkograph {
        let mut remap = vec![None; self.moves.len()];
        let mut moves = Vec::new();
        for m in self.moves.iter().filter(|m| m.phase == phase) {
            remap[m.index] = Some(moves.len());
            let mut copy = m.clone();
            copy.index = moves.len();
            moves.push(copy);
        }
        let links: Vec<Link> = self
            .links
            .iter()
            .filter_map(|l| match (remap[l.source], remap[l.target]) {
                (Some(source), Some(target)) => Some(Link {
                    source,
                    target,
                    ..l.clone()
                }),
                _ => None,
            })
            .collect();
        let metrics = LinkographMetrics::compute(&moves, &links, &self.params);
        Linkograph {
            moves,
            links,
            metrics,
            params: self.params.clone(),
        }
    }
}
