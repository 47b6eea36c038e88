use async_trait::async_trait;
use tracing::debug;

use super::telemetry::TelemetrySink;
use super::types::{
    Agent, AgentContext, AgentKind, AgentMetadata, AgentOutcome, AgentResponse, CognitiveFlag,
    ResponseType,
};
use crate::metrics::CognitiveMetrics;
use crate::routing::{QuestionPolicy, Route};
use crate::text::{contains_any, first_question, question_count, split_sentences, strip_question_lines};

/// Phrasing that hands the learner a finished answer.
const OFFLOADING_PHRASES: &[&str] = &[
    "here is the complete design",
    "here's the complete design",
    "here is the full solution",
    "here's the full solution",
    "i have designed",
    "i've designed",
    "i designed it for you",
    "the final design is",
    "just copy",
    "copy this layout",
    "the answer is simply",
];

const REFLECTIVE_MARKERS: &[&str] = &["why", "what led you", "your reasoning", "reflect*", "evidence"];

/// Drop sentences that dump answers on the learner. Returns the edited text
/// and whether anything was removed.
pub fn strip_offloading(text: &str) -> (String, bool) {
    if !contains_any(text, OFFLOADING_PHRASES) {
        return (text.to_string(), false);
    }
    let kept: Vec<String> = text
        .lines()
        .map(|line| {
            split_sentences(line)
                .into_iter()
                .filter(|s| !contains_any(s, OFFLOADING_PHRASES))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.trim().is_empty())
        .collect();
    (kept.join("\n"), true)
}

/// Response-level estimates of the six metrics for a reply on a route.
pub fn estimate_response_metrics(route: Route, text: &str) -> CognitiveMetrics {
    let asks = question_count(text) > 0;
    let reflective = contains_any(text, REFLECTIVE_MARKERS);

    let (offloading, deep, scaffolding, integration) = match route {
        Route::SupportiveScaffolding => (0.7, 0.3, 0.8, 0.4),
        Route::KnowledgeOnly => (0.5, 0.2, 0.4, 0.7),
        Route::BalancedGuidance => (0.8, 0.6, 0.7, 0.6),
        Route::SocraticExploration => (0.9, 0.7, 0.5, 0.4),
        Route::CognitiveChallenge => (0.9, 0.8, 0.4, 0.3),
    };
    let progression = if asks { 0.6 } else { 0.5 };
    let metacognition = if reflective { 0.6 } else { 0.3 };

    CognitiveMetrics::from_scores(
        offloading,
        deep,
        scaffolding,
        integration,
        progression,
        metacognition,
    )
}

/// Post-processes the composed draft so it honours the route's question
/// policy and keeps the thinking with the learner.
#[derive(Debug, Clone, Default)]
pub struct CognitiveEnhancementAgent;

impl CognitiveEnhancementAgent {
    /// Create an enhancement agent
    pub fn new() -> Self {
        Self
    }

    /// Rewrite `draft` for `route`. Returns the final text, the flags raised
    /// and a log of edits.
    pub fn enforce(
        &self,
        route: Route,
        draft: &str,
        anchor: &str,
    ) -> (String, Vec<CognitiveFlag>, Vec<String>) {
        let mut flags = Vec::new();
        let mut edits = Vec::new();

        let (mut text, offloaded) = strip_offloading(draft);
        if offloaded {
            flags.push(CognitiveFlag::OffloadingPrevented);
            edits.push("removed answer-dumping sentences".to_string());
        }

        let policy = route.question_policy();
        if !policy.complies(&text) || route == Route::KnowledgeOnly {
            match policy {
                QuestionPolicy::NoQuestion => {
                    if question_count(&text) > 0 {
                        text = strip_question_lines(&text);
                        edits.push("removed questions".to_string());
                    }
                    if text.trim().is_empty() {
                        text = format!(
                            "Start by listing what {} needs to do, then sketch one option.",
                            anchor
                        );
                        edits.push("inserted fallback guidance".to_string());
                    }
                }
                QuestionPolicy::OneQuestion => {
                    text = match first_question(&text) {
                        Some(q) => q,
                        None => format!("What would you test first in {}?", anchor),
                    };
                    edits.push("reduced to a single question".to_string());
                }
                QuestionPolicy::GuidanceThenOneQuestion => {
                    let question = first_question(&text)
                        .unwrap_or_else(|| format!("Which of these matters most for {}?", anchor));
                    let mut guidance = strip_question_lines(&text);
                    if guidance.trim().is_empty() {
                        guidance = format!(
                            "Start from the activities {} must support and how they relate.",
                            anchor
                        );
                    }
                    text = format!("{}\n\n{}", guidance, question);
                    edits.push("reordered to guidance then one question".to_string());
                }
            }
        }

        if route == Route::KnowledgeOnly {
            text.push_str(&format!(
                "\n\nBefore you apply this, consider how it changes the layout of {}.",
                anchor
            ));
            flags.push(CognitiveFlag::ReflectionPrompted);
        }

        (text, flags, edits)
    }
}

#[async_trait]
impl Agent for CognitiveEnhancementAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Enhancement
    }

    async fn respond(&self, ctx: &AgentContext, _telemetry: &TelemetrySink) -> AgentOutcome {
        let Some(draft) = &ctx.draft else {
            return AgentOutcome::Degraded {
                reason: "no draft to enhance".to_string(),
            };
        };
        let route = ctx.route_or_default();
        let anchor = ctx.session.project_anchor();
        let (text, flags, edits) = self.enforce(route, &draft.response_text, &anchor);

        debug!(route = %route, edits = edits.len(), "Draft enhanced");

        let mut response = AgentResponse::new(AgentKind::Enhancement, ResponseType::Enhanced, text)
            .with_key_points(draft.key_points.clone());
        for flag in draft.cognitive_flags.iter().chain(flags.iter()) {
            response.add_flag(*flag);
        }
        let metrics = estimate_response_metrics(route, &response.response_text);
        AgentOutcome::Ok(
            response
                .with_metrics(metrics)
                .with_metadata(AgentMetadata::Enhancement {
                    policy: route.question_policy(),
                    edits,
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::SessionView;

    const ANCHOR: &str = "your library";

    #[test]
    fn test_knowledge_only_strips_questions_and_prompts_reflection() {
        let agent = CognitiveEnhancementAgent::new();
        let (text, flags, _) = agent.enforce(
            Route::KnowledgeOnly,
            "Ramps need a 1:12 slope (ADA 405.2). What slope will you use?",
            ANCHOR,
        );
        assert!(QuestionPolicy::NoQuestion.complies(&text));
        assert!(text.contains("1:12"));
        assert!(flags.contains(&CognitiveFlag::ReflectionPrompted));
    }

    #[test]
    fn test_one_question_policy_keeps_first_question() {
        let agent = CognitiveEnhancementAgent::new();
        let (text, _, edits) = agent.enforce(
            Route::CognitiveChallenge,
            "Nice. Why north? And why glass?",
            ANCHOR,
        );
        assert_eq!(text, "Why north?");
        assert_eq!(edits.len(), 1);
    }

    #[test]
    fn test_balanced_policy_is_repaired() {
        let agent = CognitiveEnhancementAgent::new();
        let (text, _, _) = agent.enforce(
            Route::BalancedGuidance,
            "Which zone first? Group loud spaces together.",
            ANCHOR,
        );
        assert!(QuestionPolicy::GuidanceThenOneQuestion.complies(&text));
        assert!(text.starts_with("Group loud spaces together."));
    }

    #[test]
    fn test_compliant_draft_is_untouched() {
        let agent = CognitiveEnhancementAgent::new();
        let draft = "- Group spaces by noise.\n\nWhich zone matters most for your library?";
        let (text, flags, edits) = agent.enforce(Route::BalancedGuidance, draft, ANCHOR);
        assert_eq!(text, draft);
        assert!(flags.is_empty());
        assert!(edits.is_empty());
    }

    #[test]
    fn test_offloading_is_removed() {
        let (text, removed) =
            strip_offloading("Here is the complete design for you. Think about the entrance.");
        assert!(removed);
        assert_eq!(text, "Think about the entrance.");
    }

    #[test]
    fn test_estimates_are_in_range() {
        for route in Route::ALL {
            let m = estimate_response_metrics(route, "Why does the entrance face east?");
            for metric in crate::metrics::CognitiveMetric::ALL {
                assert!((0.0..=1.0).contains(&m.get(metric)));
            }
        }
    }

    #[tokio::test]
    async fn test_respond_merges_draft_flags() {
        let agent = CognitiveEnhancementAgent::new();
        let mut ctx = AgentContext::new(SessionView::default(), "Obviously perfect");
        ctx.route = Some(Route::CognitiveChallenge);
        ctx.draft = Some(
            AgentResponse::new(AgentKind::Socratic, ResponseType::SocraticQuestion, "Why there?")
                .with_flag(CognitiveFlag::DeepThinkingEncouraged),
        );
        let response = agent
            .respond(&ctx, &TelemetrySink::new())
            .await
            .response()
            .unwrap();
        assert_eq!(response.response_type, ResponseType::Enhanced);
        assert!(response.has_flag(CognitiveFlag::DeepThinkingEncouraged));
        assert!(response.enhancement_metrics.overall > 0.0);
    }

    #[tokio::test]
    async fn test_respond_without_draft_degrades() {
        let agent = CognitiveEnhancementAgent::new();
        let ctx = AgentContext::new(SessionView::default(), "hi");
        assert!(!agent.respond(&ctx, &TelemetrySink::new()).await.is_ok());
    }
}
