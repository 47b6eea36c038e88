use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::telemetry::{TelemetryEvent, TelemetrySink};
use super::types::{Agent, AgentContext, AgentKind, AgentMetadata, AgentOutcome, AgentResponse, ResponseType};
use crate::error::AppResult;
use crate::linkography::DesignPhase;
use crate::llm::MessageRole;
use crate::phase::LearningStep;
use crate::text::{contains_any, matched_markers, word_count};

/// Structured reading of a drawing or model photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualAnalysis {
    pub drawing_type: String,
    pub strengths: Vec<String>,
    pub opportunities: Vec<String>,
    pub elements: Vec<String>,
    pub description: String,
    pub confidence: f64,
}

/// Pluggable analyser for visual artefacts.
#[async_trait]
pub trait VisualAnalyzer: Send + Sync {
    /// Analyse raw image bytes.
    async fn analyse(&self, image: &[u8]) -> AppResult<VisualAnalysis>;
}

/// Where the learner is in the design process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseAnalysis {
    pub phase: DesignPhase,
    pub step: LearningStep,
    pub confidence: f64,
    /// Moves in the current phase's sub-linkograph.
    pub moves_in_phase: usize,
    /// Link density of the current phase's sub-linkograph.
    pub phase_link_density: f64,
}

/// Output of the analysis agent. Internal only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub strengths: Vec<String>,
    pub opportunities: Vec<String>,
    pub identified_elements: Vec<String>,
    pub confidence: f64,
    pub phase_analysis: PhaseAnalysis,
    pub visual: Option<VisualAnalysis>,
}

const ELEMENTS: &[&str] = &[
    "entrance", "lobby", "courtyard", "atrium", "corridor", "stair", "ramp", "elevator",
    "hall", "classroom", "kitchen", "workshop", "library", "office", "toilet", "roof",
    "facade", "window", "wall", "column", "structure", "garden", "landscape", "plaza",
    "parking", "circulation", "daylight", "ventilation", "acoustic", "storage",
];

const USER_MARKERS: &[&str] = &[
    "user", "people", "visitor", "resident", "community", "children", "elderly", "staff",
    "student", "occupant",
];

const DETAILED_TURN_WORDS: usize = 30;
const MAX_CONFIDENCE: f64 = 0.9;

/// Inspects the session state and produces a structured summary that the
/// other agents read. Never speaks to the learner.
#[derive(Clone, Default)]
pub struct AnalysisAgent {
    visual: Option<Arc<dyn VisualAnalyzer>>,
}

impl AnalysisAgent {
    /// Create an analysis agent without a visual analyser
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a visual analyser
    pub fn with_visual_analyzer(mut self, analyzer: Arc<dyn VisualAnalyzer>) -> Self {
        self.visual = Some(analyzer);
        self
    }

    /// Summarise the turn. Pure apart from the visual analyser.
    pub fn summarise(&self, ctx: &AgentContext, visual: Option<VisualAnalysis>) -> AnalysisSummary {
        let learner_text: String = ctx
            .recent_messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .chain(std::iter::once(ctx.input.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut identified_elements: Vec<String> = matched_markers(&learner_text, ELEMENTS)
            .into_iter()
            .map(str::to_string)
            .collect();

        let graph = &ctx.session.linkograph;
        let mut strengths = Vec::new();
        let mut opportunities = Vec::new();

        if graph.critical_move_ratio > 0.0 {
            strengths.push("Key ideas are being revisited and built upon".to_string());
        }
        if graph.link_density >= 1.0 {
            strengths.push("Ideas are well connected across turns".to_string());
        }
        if identified_elements.len() >= 3 {
            strengths.push("The design addresses several spatial elements".to_string());
        }
        if word_count(&ctx.input) >= DETAILED_TURN_WORDS {
            strengths.push("Design intent is articulated in detail".to_string());
        }

        if graph.move_count >= 3 && graph.orphan_ratio >= 0.5 {
            opportunities
                .push("Many ideas stand alone; connect them to earlier decisions".to_string());
        }
        if identified_elements.is_empty() {
            opportunities.push("Name the specific spaces or elements under discussion".to_string());
        }
        if !contains_any(&learner_text, USER_MARKERS) {
            opportunities.push("Consider who will use the spaces and how".to_string());
        }

        let mut confidence = 0.4
            + 0.1 * identified_elements.len().min(3) as f64
            + if graph.move_count >= 3 { 0.2 } else { 0.0 };
        confidence = confidence.min(MAX_CONFIDENCE);

        if let Some(v) = &visual {
            for element in &v.elements {
                let element = element.to_lowercase();
                if !identified_elements.contains(&element) {
                    identified_elements.push(element);
                }
            }
            strengths.extend(v.strengths.iter().cloned());
            opportunities.extend(v.opportunities.iter().cloned());
            confidence = (confidence + v.confidence.clamp(0.0, 1.0)) / 2.0;
        }

        AnalysisSummary {
            strengths,
            opportunities,
            identified_elements,
            confidence,
            phase_analysis: PhaseAnalysis {
                phase: ctx.phase.phase,
                step: ctx.phase.step,
                confidence: ctx.phase.confidence,
                moves_in_phase: ctx.session.phase_linkograph.move_count,
                phase_link_density: ctx.session.phase_linkograph.link_density,
            },
            visual,
        }
    }
}

#[async_trait]
impl Agent for AnalysisAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Analysis
    }

    async fn respond(&self, ctx: &AgentContext, telemetry: &TelemetrySink) -> AgentOutcome {
        let visual = match (&self.visual, &ctx.image) {
            (Some(analyzer), Some(image)) => {
                let start = Instant::now();
                match analyzer.analyse(image).await {
                    Ok(v) => Some(v),
                    Err(e) => {
                        // A failed drawing read only narrows the summary.
                        warn!(error = %e, "Visual analysis failed");
                        telemetry.record(TelemetryEvent::llm_failed(
                            AgentKind::Analysis,
                            start.elapsed().as_millis() as u64,
                            e.to_string(),
                        ));
                        None
                    }
                }
            }
            _ => None,
        };

        let summary = self.summarise(ctx, visual);
        debug!(
            elements = summary.identified_elements.len(),
            confidence = summary.confidence,
            phase = %summary.phase_analysis.phase,
            "Analysis complete"
        );

        let text = format!(
            "{} elements, {} strengths, {} opportunities",
            summary.identified_elements.len(),
            summary.strengths.len(),
            summary.opportunities.len()
        );
        AgentOutcome::Ok(
            AgentResponse::new(AgentKind::Analysis, ResponseType::Analysis, text)
                .with_key_points(summary.opportunities.clone())
                .with_metadata(AgentMetadata::Analysis(summary)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::SessionView;
    use crate::error::AppError;
    use crate::linkography::LinkographMetrics;

    struct FixedVisual;

    #[async_trait]
    impl VisualAnalyzer for FixedVisual {
        async fn analyse(&self, _image: &[u8]) -> AppResult<VisualAnalysis> {
            Ok(VisualAnalysis {
                drawing_type: "floor_plan".to_string(),
                strengths: vec!["Clear zoning".to_string()],
                opportunities: vec![],
                elements: vec!["Courtyard".to_string(), "Stair".to_string()],
                description: "Ground floor plan".to_string(),
                confidence: 0.8,
            })
        }
    }

    struct BrokenVisual;

    #[async_trait]
    impl VisualAnalyzer for BrokenVisual {
        async fn analyse(&self, _image: &[u8]) -> AppResult<VisualAnalysis> {
            Err(AppError::Internal {
                message: "model offline".to_string(),
            })
        }
    }

    fn context(input: &str) -> AgentContext {
        AgentContext::new(SessionView::default(), input)
    }

    #[tokio::test]
    async fn test_identifies_elements_and_opportunities() {
        let agent = AnalysisAgent::new();
        let ctx = context("The entrance opens onto a courtyard with a ramp.");
        let outcome = agent.respond(&ctx, &TelemetrySink::new()).await;
        let response = outcome.response().unwrap();
        assert_eq!(response.response_type, ResponseType::Analysis);

        let AgentMetadata::Analysis(summary) = response.metadata else {
            panic!("expected analysis metadata");
        };
        assert_eq!(
            summary.identified_elements,
            vec!["entrance", "courtyard", "ramp"]
        );
        assert!(summary
            .opportunities
            .iter()
            .any(|o| o.contains("who will use")));
        assert!((summary.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_elements_inside_longer_words_are_ignored() {
        let ctx = context("We shall test a fire proof finish so swallows can nest.");
        let summary = AnalysisAgent::new().summarise(&ctx, None);
        assert!(summary.identified_elements.is_empty());

        let ctx = context("Both halls open onto the gardens.");
        let summary = AnalysisAgent::new().summarise(&ctx, None);
        assert_eq!(summary.identified_elements, vec!["hall", "garden"]);
    }

    #[test]
    fn test_phase_analysis_reads_sub_linkograph() {
        let mut ctx = context("hello");
        ctx.session.phase_linkograph = LinkographMetrics {
            move_count: 4,
            link_density: 1.25,
            ..LinkographMetrics::default()
        };
        let summary = AnalysisAgent::new().summarise(&ctx, None);
        assert_eq!(summary.phase_analysis.moves_in_phase, 4);
        assert!((summary.phase_analysis.phase_link_density - 1.25).abs() < 1e-12);
        assert_eq!(summary.phase_analysis.phase, DesignPhase::Ideation);
    }

    #[tokio::test]
    async fn test_visual_elements_are_merged() {
        let agent = AnalysisAgent::new().with_visual_analyzer(Arc::new(FixedVisual));
        let ctx = context("Here is my plan for the community courtyard.")
            .with_image(Arc::new(vec![0u8, 1, 2]));
        let response = agent
            .respond(&ctx, &TelemetrySink::new())
            .await
            .response()
            .unwrap();
        let AgentMetadata::Analysis(summary) = response.metadata else {
            panic!("expected analysis metadata");
        };
        assert_eq!(summary.identified_elements, vec!["courtyard", "stair"]);
        assert!(summary.strengths.contains(&"Clear zoning".to_string()));
        assert!(summary.visual.is_some());
    }

    #[tokio::test]
    async fn test_visual_failure_is_not_fatal() {
        let agent = AnalysisAgent::new().with_visual_analyzer(Arc::new(BrokenVisual));
        let ctx = context("A library with a reading garden.").with_image(Arc::new(vec![1u8]));
        let telemetry = TelemetrySink::new();
        let outcome = agent.respond(&ctx, &telemetry).await;
        assert!(outcome.is_ok());
        assert_eq!(telemetry.snapshot().len(), 1);
    }
}
