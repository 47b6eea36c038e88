use async_trait::async_trait;
use tracing::{debug, warn};

use super::kernel::AgentKernel;
use super::telemetry::TelemetrySink;
use super::types::{
    Agent, AgentContext, AgentKind, AgentMetadata, AgentOutcome, AgentResponse, CognitiveFlag,
    ResponseType,
};
use crate::llm::Message;
use crate::prompts::{render, SCAFFOLDING_PROMPT, SOCRATIC_QUESTION_PROMPT};
use crate::routing::{ConfidenceLevel, Route};
use crate::text::{
    content_words, first_question, split_sentences, strip_question_lines, strip_questions,
    tokenize, truncate_words, word_count,
};

/// Longest question the tutor will ask.
pub const MAX_QUESTION_WORDS: usize = 30;
const MAX_GUIDANCE_POINTS: usize = 3;
const QUESTION_MAX_TOKENS: u32 = 80;
const SCAFFOLD_MAX_TOKENS: u32 = 220;

/// Clean up a generated question: keep the first question sentence, cap it
/// at [`MAX_QUESTION_WORDS`], make it end with '?', and require it to mention
/// something from `anchors` (when there are any).
pub fn validate_question(raw: &str, anchors: &[String]) -> Option<String> {
    let question = first_question(raw)?;
    let question = question
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '"' || c.is_whitespace())
        .trim_end_matches('"')
        .to_string();

    let question = if word_count(&question) > MAX_QUESTION_WORDS {
        let cut = truncate_words(&question, MAX_QUESTION_WORDS);
        format!(
            "{}?",
            cut.trim_end_matches(|c: char| c.is_ascii_punctuation())
        )
    } else if question.ends_with('?') {
        question
    } else {
        format!("{}?", question.trim_end_matches(|c: char| c.is_ascii_punctuation()))
    };

    if question.matches('?').count() != 1 {
        return None;
    }

    if !anchors.is_empty() {
        let tokens = tokenize(&question);
        let anchored = tokens.iter().any(|t| anchors.contains(t))
            || question.to_lowercase().contains("your design")
            || question.to_lowercase().contains("your project");
        if !anchored {
            return None;
        }
    }
    Some(question)
}

/// Template question for a route and confidence level.
pub fn template_question(route: Route, confidence: ConfidenceLevel, anchor: &str) -> String {
    match (route, confidence) {
        (Route::CognitiveChallenge, _) | (_, ConfidenceLevel::Overconfident) => format!(
            "What evidence would convince a sceptical client that {} really works for the people using it?",
            anchor
        ),
        (_, ConfidenceLevel::Uncertain) => format!(
            "Which single part of {} feels clearest to you right now?",
            anchor
        ),
        (Route::SocraticExploration, _) => format!(
            "What led you to this decision for {}, and what would change if you reversed it?",
            anchor
        ),
        _ => format!(
            "Which of these ideas matters most for {}, and why?",
            anchor
        ),
    }
}

fn question_style(route: Route) -> &'static str {
    match route {
        Route::CognitiveChallenge => {
            "challenge an assumption the student has not tested; probe evidence and trade-offs"
        }
        Route::SocraticExploration => "open exploration of the reasoning behind their decision",
        _ => "help the student apply the guidance to their own project",
    }
}

fn ensure_sentence(point: &str) -> String {
    let point = point.trim();
    if point.ends_with(&['.', '!', ':', ';'][..]) {
        point.to_string()
    } else {
        format!("{}.", point)
    }
}

/// Generates at most one question per turn and, on the supportive and
/// balanced routes, the guidance that goes with it.
#[derive(Debug, Clone)]
pub struct SocraticTutor {
    kernel: AgentKernel,
}

impl SocraticTutor {
    /// Create a Socratic tutor
    pub fn new(kernel: AgentKernel) -> Self {
        Self { kernel }
    }

    fn anchors(ctx: &AgentContext) -> Vec<String> {
        let mut anchors = content_words(&ctx.session.project_context);
        for word in content_words(&ctx.input) {
            if !anchors.contains(&word) {
                anchors.push(word);
            }
        }
        anchors
    }

    fn confidence(ctx: &AgentContext) -> ConfidenceLevel {
        ctx.classification
            .as_ref()
            .map(|c| c.confidence_level)
            .unwrap_or_default()
    }

    /// One validated question, falling back to a template.
    async fn question(
        &self,
        ctx: &AgentContext,
        route: Route,
        telemetry: &TelemetrySink,
    ) -> (String, bool) {
        let confidence = Self::confidence(ctx);
        let anchor = ctx.session.project_anchor();
        let system = render(
            SOCRATIC_QUESTION_PROMPT,
            &[
                ("project", ctx.session.project_context.as_str()),
                ("phase", ctx.phase.phase.as_str()),
                ("confidence", confidence.as_str()),
                ("style", question_style(route)),
            ],
        );
        let mut messages = vec![Message::system(system)];
        messages.extend(ctx.recent_messages.iter().cloned());
        messages.push(Message::user(ctx.input.clone()));

        match self
            .kernel
            .generate(telemetry, AgentKind::Socratic, messages, Some(QUESTION_MAX_TOKENS), None)
            .await
        {
            Ok(completion) => match validate_question(&completion.content, &Self::anchors(ctx)) {
                Some(q) => (q, false),
                None => {
                    debug!(raw = %completion.content, "Generated question rejected");
                    (template_question(route, confidence, &anchor), true)
                }
            },
            Err(e) => {
                warn!(error = %e, "Question generation failed, using template");
                (template_question(route, confidence, &anchor), true)
            }
        }
    }

    /// Guidance text from the expert's key points, its first sentences, or the
    /// analysis when no expert ran.
    fn guidance(ctx: &AgentContext) -> String {
        if let Some(expert) = &ctx.expert {
            if !expert.key_points.is_empty() {
                return expert
                    .key_points
                    .iter()
                    .take(MAX_GUIDANCE_POINTS)
                    .map(|p| format!("- {}", ensure_sentence(p)))
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            let statements = strip_questions(&expert.response_text);
            let lead: Vec<String> = split_sentences(&statements).into_iter().take(2).collect();
            if !lead.is_empty() {
                return lead.join(" ");
            }
        }
        if let Some(analysis) = &ctx.analysis {
            if !analysis.opportunities.is_empty() {
                return analysis
                    .opportunities
                    .iter()
                    .take(2)
                    .map(|o| format!("- {}", ensure_sentence(o)))
                    .collect::<Vec<_>>()
                    .join("\n");
            }
        }
        format!(
            "Start from the activities {} must support and how they relate to each other.",
            ctx.session.project_anchor()
        )
    }

    fn scaffold_template(ctx: &AgentContext) -> String {
        let anchor = ctx.session.project_anchor();
        let mut text = format!(
            "Let's take this one step at a time. First, list the three main activities {} must support. \
             Next, note who uses each one and when. Then sketch a rough bubble for each and connect the ones that belong together.",
            anchor
        );
        if let Some(expert) = &ctx.expert {
            if let Some(point) = expert.key_points.first() {
                text.push_str(&format!(" Keep this in mind: {}", ensure_sentence(point)));
            }
        }
        text
    }

    async fn scaffolding(&self, ctx: &AgentContext, telemetry: &TelemetrySink) -> String {
        let references = ctx
            .expert
            .as_ref()
            .map(|e| e.key_points.join("\n"))
            .unwrap_or_default();
        let system = render(
            SCAFFOLDING_PROMPT,
            &[
                ("project", ctx.session.project_context.as_str()),
                ("phase", ctx.phase.phase.as_str()),
                ("references", references.as_str()),
            ],
        );
        let messages = vec![Message::system(system), Message::user(ctx.input.clone())];

        match self
            .kernel
            .generate(telemetry, AgentKind::Socratic, messages, Some(SCAFFOLD_MAX_TOKENS), None)
            .await
        {
            Ok(completion) => {
                let text = strip_question_lines(&completion.content);
                if text.trim().is_empty() {
                    Self::scaffold_template(ctx)
                } else {
                    text
                }
            }
            Err(e) => {
                warn!(error = %e, "Scaffolding generation failed, using template");
                Self::scaffold_template(ctx)
            }
        }
    }
}

#[async_trait]
impl Agent for SocraticTutor {
    fn kind(&self) -> AgentKind {
        AgentKind::Socratic
    }

    async fn respond(&self, ctx: &AgentContext, telemetry: &TelemetrySink) -> AgentOutcome {
        let route = ctx.route_or_default();

        let response = match route {
            Route::KnowledgeOnly => {
                return AgentOutcome::Degraded {
                    reason: "socratic tutor does not run on knowledge_only".to_string(),
                }
            }
            Route::SupportiveScaffolding => {
                let text = self.scaffolding(ctx, telemetry).await;
                AgentResponse::new(AgentKind::Socratic, ResponseType::Scaffolding, text)
                    .with_flag(CognitiveFlag::ScaffoldingProvided)
                    .with_metadata(AgentMetadata::Question {
                        question: None,
                        templated: false,
                    })
            }
            Route::BalancedGuidance => {
                let guidance = Self::guidance(ctx);
                let (question, templated) = self.question(ctx, route, telemetry).await;
                let key_points = ctx
                    .expert
                    .as_ref()
                    .map(|e| e.key_points.clone())
                    .unwrap_or_default();
                AgentResponse::new(
                    AgentKind::Socratic,
                    ResponseType::BalancedSynthesis,
                    format!("{}\n\n{}", guidance, question),
                )
                .with_flag(CognitiveFlag::BalancedGuidance)
                .with_flag(CognitiveFlag::SocraticQuestion)
                .with_key_points(key_points)
                .with_metadata(AgentMetadata::Question {
                    question: Some(question),
                    templated,
                })
            }
            Route::SocraticExploration | Route::CognitiveChallenge => {
                let (question, templated) = self.question(ctx, route, telemetry).await;
                let mut response = AgentResponse::new(
                    AgentKind::Socratic,
                    ResponseType::SocraticQuestion,
                    question.clone(),
                )
                .with_flag(CognitiveFlag::SocraticQuestion)
                .with_flag(CognitiveFlag::DeepThinkingEncouraged)
                .with_metadata(AgentMetadata::Question {
                    question: Some(question),
                    templated,
                });
                if route == Route::CognitiveChallenge {
                    response.add_flag(CognitiveFlag::ChallengeIssued);
                }
                response
            }
        };

        debug!(route = %route, flags = response.cognitive_flags.len(), "Tutor responded");
        AgentOutcome::Ok(response)
    }
}
