//! Linkography: design moves, semantic links between them and the
//! structural patterns those links form.
//!
//! A [`Linkograph`] is built either in one batch from a move list or one move
//! at a time as a session progresses; both paths yield the same graph.

mod builder;
mod patterns;
mod types;

pub use builder::LinkographBuilder;
pub use patterns::{count_kind, Pattern, PatternDetector, PatternKind};
pub use types::{
    Author, DesignPhase, Link, LinkKind, Linkograph, LinkographMetrics, LinkographParams, Move,
    MoveType,
};
