//! # MENTOR Cognitive Benchmark
//!
//! A Socratic multi-agent tutor for architecture design students, and the
//! benchmarking pipeline that measures what it does to their thinking.
//!
//! ## Features
//!
//! - **Linkography**: Design moves linked by semantic similarity, with
//!   chunk, web, sawtooth, orphan, breakthrough and struggle patterns
//! - **Cognitive Metrics**: Six pedagogical scores mapped from linkograph
//!   structure and compared against fixed tutoring baselines
//! - **Mentor Workflow**: Context, analysis, domain expert, Socratic tutor
//!   and cognitive enhancement agents run as a fixed per-turn DAG
//! - **Study Arms**: Mentor, generic assistant and control sessions share
//!   one turn pipeline so their metrics are comparable
//! - **Aggregation**: Master per-session and per-metric CSV tables
//!   regenerated from the session store
//!
//! ## Architecture
//!
//! ```text
//! Learner → TutorSession → MentorWorkflow → Agents → LLM (HTTP)
//!                ↓                             ↓
//!          Linkograph + Metrics          Embeddings (cache)
//!                ↓
//!          SQLite (sessions, moves, interactions, artefacts)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use mentor_cogbench::{Config, CoreContext, Orchestrator};
//! use mentor_cogbench::session::{Arm, Proficiency};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let orchestrator = Orchestrator::new(CoreContext::from_config(config).await?);
//!     let mut session = orchestrator
//!         .start_session(Arm::Mentor, Proficiency::Beginner, "community centre")
//!         .await?;
//!     let reply = session.process_turn("Where should the main entrance go?").await;
//!     println!("{}", reply.text);
//!     let report = session.finalize().await?;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Agent kernel and the five tutoring agents.
pub mod agents;
/// Configuration management.
pub mod config;
/// Embedding backends, cache and service.
pub mod embedding;
/// Error types and result aliases for the application.
pub mod error;
/// Design moves, linkographs and pattern detection.
pub mod linkography;
/// Chat-completions client.
pub mod llm;
/// Cognitive metrics, baselines and aggregation.
pub mod metrics;
/// Session orchestration and the mentor workflow.
pub mod orchestrator;
/// Design phase and learning step tracking.
pub mod phase;
/// System prompts for the tutoring agents.
pub mod prompts;
/// Classification vocabulary and route selection.
pub mod routing;
/// Session records, transcripts and derived reports.
pub mod session;
/// SQLite storage layer for persistence.
pub mod storage;
/// Shared text-processing helpers.
pub mod text;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::{CoreContext, Orchestrator, TurnReply, TutorSession};
