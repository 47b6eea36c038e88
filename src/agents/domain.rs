use async_trait::async_trait;
use tracing::{debug, warn};

use super::kernel::AgentKernel;
use super::telemetry::TelemetrySink;
use super::types::{
    Agent, AgentContext, AgentKind, AgentMetadata, AgentOutcome, AgentResponse, CognitiveFlag,
    ResponseType,
};
use crate::llm::Message;
use crate::prompts::{render, DOMAIN_EXPERT_PROMPT};
use crate::text::{bullet_points, keyword_hits, strip_question_lines};

/// One entry of the built-in architecture reference table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reference {
    pub topic: &'static str,
    pub source: &'static str,
    keywords: &'static [&'static str],
    pub points: &'static [&'static str],
}

impl Reference {
    fn relevance(&self, text: &str) -> usize {
        keyword_hits(text, self.keywords)
    }

    fn render(&self) -> String {
        let mut out = format!("{} ({}):", self.topic, self.source);
        for point in self.points {
            out.push_str("\n- ");
            out.push_str(point);
        }
        out
    }
}

/// Accessibility, egress, daylight, planning and structure rules of thumb.
pub const REFERENCES: &[Reference] = &[
    Reference {
        topic: "Accessible ramps",
        source: "2010 ADA Standards 405",
        keywords: &["ramp", "slope", "wheelchair", "gradient"],
        points: &[
            "Running slope no steeper than 1:12 (ADA 405.2).",
            "Maximum rise of 30 in (760 mm) per run (ADA 405.6).",
            "Level landings at least 60 in (1525 mm) long at the top and bottom of each run (ADA 405.7).",
            "Clear width of at least 36 in (915 mm) (ADA 405.5).",
            "Handrails on both sides once the rise exceeds 6 in (150 mm) (ADA 405.8).",
        ],
    },
    Reference {
        topic: "Doors",
        source: "2010 ADA Standards 404",
        keywords: &["door", "doorway", "opening width"],
        points: &[
            "Clear opening width of at least 32 in (815 mm) (ADA 404.2.3).",
            "Maneuvering clearance on both sides of the door (ADA 404.2.4).",
            "Thresholds no higher than 1/2 in (13 mm) (ADA 404.2.5).",
        ],
    },
    Reference {
        topic: "Stairs",
        source: "IBC 1011",
        keywords: &["stair", "riser", "tread", "steps"],
        points: &[
            "Riser heights between 4 in and 7 in (IBC 1011.5.2).",
            "Tread depth of at least 11 in (IBC 1011.5.2).",
            "Handrails on both sides of the stair (IBC 1011.11).",
        ],
    },
    Reference {
        topic: "Corridors",
        source: "IBC 1020",
        keywords: &["corridor", "hallway", "passage"],
        points: &[
            "Minimum corridor width of 44 in where the occupant load exceeds 50 (IBC 1020.2).",
            "Dead-end corridors limited to about 20 ft in most occupancies (IBC 1020.4).",
        ],
    },
    Reference {
        topic: "Means of egress",
        source: "IBC 1006 and 1017",
        keywords: &["egress", "exit", "fire escape", "evacuat*", "occupant load"],
        points: &[
            "Assembly spaces with more than 49 occupants need two exits (IBC 1006.2).",
            "Separate the exits by at least half the diagonal of the space (IBC 1007.1.1).",
            "Exit access travel distance of roughly 200-250 ft depending on sprinklers (IBC 1017.2).",
        ],
    },
    Reference {
        topic: "Daylighting",
        source: "daylighting rules of thumb",
        keywords: &["daylight", "natural light", "window", "glare", "sun"],
        points: &[
            "Useful daylight reaches about 1.5 to 2 times the window head height into a room.",
            "Glazing of roughly 15-20% of the floor area suits most occupied rooms.",
            "North light in the northern hemisphere gives even, glare-free illumination.",
        ],
    },
    Reference {
        topic: "Community facility planning",
        source: "community centre planning guidance",
        keywords: &[
            "community centre",
            "community center",
            "organise spaces",
            "organize spaces",
            "zoning",
            "multipurpose",
            "program",
        ],
        points: &[
            "Group spaces by activity level: loud (hall, sports), active (workshops, kitchen) and quiet (library, meeting rooms).",
            "Put reception and a shared foyer at the entrance to orient visitors and control access.",
            "Keep the main hall close to the entrance so it can open after hours on its own.",
            "Collect storage, toilets and plant along a back-of-house edge.",
        ],
    },
    Reference {
        topic: "Structural sizing",
        source: "structural rules of thumb",
        keywords: &["structure", "span", "beam", "column", "cantilever", "slab", "joist"],
        points: &[
            "Timber joists and steel beams: depth around span/20.",
            "One-way concrete slabs: thickness around span/30.",
            "Keep cantilevers within about a third of the back span.",
        ],
    },
];

const MAX_REFERENCES: usize = 2;
const MAX_KEY_POINTS: usize = 4;
const EXPERT_MAX_TOKENS: u32 = 350;

/// Table entries relevant to a text, best match first, table order on ties.
pub fn find_references(text: &str) -> Vec<&'static Reference> {
    let mut scored: Vec<(usize, usize, &'static Reference)> = REFERENCES
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let hits = r.relevance(text);
            (hits > 0).then_some((hits, i, r))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(MAX_REFERENCES)
        .map(|(_, _, r)| r)
        .collect()
}

/// Produces short, cited technical guidance. Grounds the LLM in the
/// reference table and answers from the table alone when the LLM is down.
#[derive(Debug, Clone)]
pub struct DomainExpert {
    kernel: AgentKernel,
}

impl DomainExpert {
    /// Create a domain expert
    pub fn new(kernel: AgentKernel) -> Self {
        Self { kernel }
    }

    fn offline_answer(references: &[&Reference]) -> (String, Vec<String>) {
        let points: Vec<String> = references
            .iter()
            .flat_map(|r| r.points.iter())
            .take(MAX_KEY_POINTS)
            .map(|p| p.to_string())
            .collect();
        let sources: Vec<&str> = references.iter().map(|r| r.source).collect();
        let mut text = format!("Key references ({}):", sources.join("; "));
        for point in &points {
            text.push_str("\n- ");
            text.push_str(point);
        }
        (text, points)
    }
}

#[async_trait]
impl Agent for DomainExpert {
    fn kind(&self) -> AgentKind {
        AgentKind::DomainExpert
    }

    async fn respond(&self, ctx: &AgentContext, telemetry: &TelemetrySink) -> AgentOutcome {
        let mut references = find_references(&ctx.input);
        if references.is_empty() {
            references = find_references(&ctx.session.project_context);
        }

        let reference_text = if references.is_empty() {
            "(no table entry matched; rely on general practice)".to_string()
        } else {
            references
                .iter()
                .map(|r| r.render())
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        let system = render(
            DOMAIN_EXPERT_PROMPT,
            &[
                ("project", ctx.session.project_context.as_str()),
                ("phase", ctx.phase.phase.as_str()),
                ("references", reference_text.as_str()),
            ],
        );
        let mut messages = vec![Message::system(system)];
        messages.extend(ctx.recent_messages.iter().cloned());
        messages.push(Message::user(ctx.input.clone()));

        let generated = self
            .kernel
            .generate(
                telemetry,
                AgentKind::DomainExpert,
                messages,
                Some(EXPERT_MAX_TOKENS),
                None,
            )
            .await;

        let (text, key_points, offline) = match generated {
            Ok(completion) => {
                let text = strip_question_lines(&completion.content);
                if text.trim().is_empty() {
                    warn!("Domain expert reply contained only questions");
                    let (text, points) = Self::offline_answer(&references);
                    (text, points, true)
                } else {
                    let mut points = bullet_points(&text);
                    points.truncate(MAX_KEY_POINTS);
                    (text, points, false)
                }
            }
            Err(e) if !references.is_empty() => {
                warn!(error = %e, "Domain expert answering from reference table");
                let (text, points) = Self::offline_answer(&references);
                (text, points, true)
            }
            Err(e) => {
                return AgentOutcome::Degraded {
                    reason: format!("domain expert unavailable: {}", e),
                }
            }
        };

        if references.is_empty() && offline {
            return AgentOutcome::Degraded {
                reason: "domain expert had no usable content".to_string(),
            };
        }

        debug!(
            references = references.len(),
            key_points = key_points.len(),
            offline,
            "Domain expert responded"
        );

        AgentOutcome::Ok(
            AgentResponse::new(AgentKind::DomainExpert, ResponseType::Knowledge, text)
                .with_flag(CognitiveFlag::KnowledgeProvided)
                .with_key_points(key_points)
                .with_metadata(AgentMetadata::Knowledge {
                    topics: references.iter().map(|r| r.topic.to_string()).collect(),
                    sources: references.iter().map(|r| r.source.to_string()).collect(),
                    offline,
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::SessionView;
    use crate::config::LlmConfig;
    use crate::error::{LlmError, LlmResult};
    use crate::llm::{ChatRequest, Completion, LlmBackend, Usage};
    use std::sync::Arc;

    struct Fixed(&'static str);

    #[async_trait]
    impl LlmBackend for Fixed {
        async fn generate(&self, request: &ChatRequest) -> LlmResult<Completion> {
            assert!(request.messages[0].content.contains("domain expert"));
            Ok(Completion::new(self.0, Usage::default()))
        }
    }

    struct Down;

    #[async_trait]
    impl LlmBackend for Down {
        async fn generate(&self, _request: &ChatRequest) -> LlmResult<Completion> {
            Err(LlmError::Unavailable {
                message: "offline".to_string(),
                retries: 2,
            })
        }
    }

    fn expert(backend: Arc<dyn LlmBackend>) -> DomainExpert {
        DomainExpert::new(AgentKernel::new(backend, LlmConfig::default()))
    }

    fn context(input: &str) -> AgentContext {
        AgentContext::new(SessionView::default(), input)
    }

    #[test]
    fn test_find_references_ranks_by_hits() {
        let refs = find_references("What is the ADA ramp slope requirement?");
        assert_eq!(refs[0].topic, "Accessible ramps");
        assert!(find_references("hello there").is_empty());
        let refs = find_references("How should I organise spaces for a community centre?");
        assert_eq!(refs[0].topic, "Community facility planning");
    }

    #[tokio::test]
    async fn test_llm_answer_is_stripped_of_questions() {
        let agent = expert(Arc::new(Fixed(
            "Ramps:\n- Slope 1:12 max (ADA 405.2).\n- Rise 30 in per run (ADA 405.6).\nWhat slope will you use?",
        )));
        let response = agent
            .respond(&context("ADA ramp slope?"), &TelemetrySink::new())
            .await
            .response()
            .unwrap();
        assert!(!response.response_text.contains('?'));
        assert_eq!(response.key_points.len(), 2);
        assert!(response.has_flag(CognitiveFlag::KnowledgeProvided));
    }

    #[tokio::test]
    async fn test_offline_answer_from_table() {
        let agent = expert(Arc::new(Down));
        let telemetry = TelemetrySink::new();
        let response = agent
            .respond(
                &context("What is the ADA ramp slope requirement?"),
                &telemetry,
            )
            .await
            .response()
            .unwrap();
        assert!(response.response_text.contains("1:12"));
        assert!(matches!(
            response.metadata,
            AgentMetadata::Knowledge { offline: true, .. }
        ));
        assert_eq!(telemetry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_degrades_without_llm_or_table() {
        let agent = expert(Arc::new(Down));
        let outcome = agent
            .respond(&context("Tell me something interesting"), &TelemetrySink::new())
            .await;
        assert!(matches!(outcome, AgentOutcome::Degraded { .. }));
    }
}
