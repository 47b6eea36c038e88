//! Integration tests for the cognitive mapper, baselines and the master
//! table aggregator.

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use mentor_cogbench::embedding::{EmbeddingService, HashingEmbedder};
use mentor_cogbench::linkography::{
    Author, DesignPhase, Linkograph, LinkographBuilder, Move, PatternDetector,
};
use mentor_cogbench::metrics::{
    relative_improvement, CognitiveMapper, CognitiveMetric, CognitiveMetrics, InteractionSignals,
    MetricAggregator, ScientificBaselines, TurnSignal, AGGREGATE_TABLE, SESSION_TABLE,
};
use mentor_cogbench::session::{Arm, Proficiency, SessionAnalyzer, SessionRecord};
use mentor_cogbench::storage::{SqliteStorage, Storage};

const STUDIO: &[&str] = &[
    "The community centre should open onto the market square",
    "A covered arcade along the market square could shelter stalls",
    "Looking back, I realize the arcade blocks the morning sun",
    "Actually, the arcade could step back from the square",
    "The hall needs daylight from the north",
    "The arcade and the hall could share one long roof",
];

fn hashing_service() -> EmbeddingService {
    EmbeddingService::new(Arc::new(HashingEmbedder::new("hashing-test", 256)), 128)
}

async fn studio_graph() -> Linkograph {
    let moves: Vec<Move> = STUDIO
        .iter()
        .enumerate()
        .map(|(i, t)| Move::new(i, Author::Student, *t, DesignPhase::Ideation))
        .collect();
    LinkographBuilder::default()
        .build(moves, &hashing_service())
        .await
        .unwrap()
}

fn assert_unit_interval(metrics: &CognitiveMetrics) {
    for metric in CognitiveMetric::ALL {
        let value = metrics.get(metric);
        assert!(
            (0.0..=1.0).contains(&value),
            "{} outside [0, 1]: {}",
            metric,
            value
        );
    }
    assert!((0.0..=1.0).contains(&metrics.overall));
}

mod baseline_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_baselines() {
        let b = ScientificBaselines::default();
        assert_eq!(b.get(CognitiveMetric::CognitiveOffloadingPrevention), 0.48);
        assert_eq!(b.get(CognitiveMetric::DeepThinkingEngagement), 0.42);
        assert_eq!(b.get(CognitiveMetric::ScaffoldingEffectiveness), 0.61);
        assert_eq!(b.get(CognitiveMetric::KnowledgeIntegration), 0.29);
        assert_eq!(b.get(CognitiveMetric::LearningProgression), 0.35);
        assert_eq!(b.get(CognitiveMetric::MetacognitiveAwareness), 0.31);
    }

    #[test]
    fn test_compare_reports_each_metric_in_order() {
        let measured = CognitiveMetrics::from_scores(0.96, 0.42, 0.61, 0.29, 0.35, 0.31);
        let comparison = ScientificBaselines::default().compare(&measured);

        let order: Vec<CognitiveMetric> =
            comparison.improvements.iter().map(|i| i.metric).collect();
        assert_eq!(order, CognitiveMetric::ALL.to_vec());
        assert!((comparison.improvements[0].improvement - 1.0).abs() < 1e-12);
        assert!((comparison.overall_improvement - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_relative_improvement_sign() {
        assert!(relative_improvement(0.61, 0.61).abs() < 1e-12);
        assert!(relative_improvement(0.9, 0.61) > 0.0);
        assert!(relative_improvement(0.1, 0.61) < 0.0);
        assert_eq!(relative_improvement(0.3, -1.0), 0.0);
    }

    #[test]
    fn test_from_scores_clamps_out_of_range() {
        let m = CognitiveMetrics::from_scores(1.5, -0.2, f64::NAN, 0.5, 0.5, 0.5);
        assert_eq!(m.cognitive_offloading_prevention, 1.0);
        assert_eq!(m.deep_thinking_engagement, 0.0);
        assert_eq!(m.scaffolding_effectiveness, 0.0);
        assert!((m.overall - 2.5 / 6.0).abs() < 1e-12);
    }
}

mod mapper_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_studio_session_scores_in_range() {
        let graph = studio_graph().await;
        let patterns = PatternDetector::for_graph(&graph).detect(&graph);
        let metrics = CognitiveMapper::default().map(&graph, &patterns, None);
        assert_unit_interval(&metrics);
        assert!(metrics.metacognitive_awareness > 0.0, "reflection and a correction are present");
    }

    #[tokio::test]
    async fn test_mapping_is_reproducible_across_builds() {
        let mapper = CognitiveMapper::default();
        let first = studio_graph().await;
        let second = studio_graph().await;
        let a = mapper.map(&first, &PatternDetector::for_graph(&first).detect(&first), None);
        let b = mapper.map(&second, &PatternDetector::for_graph(&second).detect(&second), None);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_signals_only_move_scaffolding() {
        let graph = studio_graph().await;
        let patterns = PatternDetector::for_graph(&graph).detect(&graph);
        let mapper = CognitiveMapper::default();

        let good = InteractionSignals {
            turns: vec![
                TurnSignal {
                    route_appropriate: true,
                    guidance_fit: 1.0,
                    understanding: 0.0,
                    tutor_question: true,
                },
                TurnSignal {
                    route_appropriate: true,
                    guidance_fit: 1.0,
                    understanding: 1.0,
                    tutor_question: true,
                },
            ],
        };
        let poor = InteractionSignals {
            turns: vec![
                TurnSignal {
                    route_appropriate: false,
                    guidance_fit: 0.0,
                    understanding: 1.0,
                    tutor_question: false,
                },
                TurnSignal {
                    route_appropriate: false,
                    guidance_fit: 0.0,
                    understanding: 0.0,
                    tutor_question: false,
                },
            ],
        };

        let with_good = mapper.map(&graph, &patterns, Some(&good));
        let with_poor = mapper.map(&graph, &patterns, Some(&poor));

        assert!((with_good.scaffolding_effectiveness - 1.0).abs() < 1e-12);
        assert_eq!(with_poor.scaffolding_effectiveness, 0.0);
        assert_eq!(
            with_good.deep_thinking_engagement,
            with_poor.deep_thinking_engagement
        );
        assert_eq!(
            with_good.knowledge_integration,
            with_poor.knowledge_integration
        );
    }

    #[tokio::test]
    async fn test_single_turn_signal_uses_neutral_improvement() {
        let graph = studio_graph().await;
        let signals = InteractionSignals {
            turns: vec![TurnSignal {
                route_appropriate: false,
                guidance_fit: 0.0,
                understanding: 1.0,
                tutor_question: true,
            }],
        };
        let metrics = CognitiveMapper::default().map(&graph, &[], Some(&signals));
        assert!((metrics.scaffolding_effectiveness - 0.15).abs() < 1e-12);
    }
}

mod aggregate_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn seed(store: &SqliteStorage, id: &str, arm: Arm, proficiency: Proficiency, texts: &[&str]) {
        let session = SessionRecord::new(arm, proficiency, "market hall").with_id(id);
        store.create_session(&session).await.unwrap();

        let service = hashing_service();
        let start = session.created_at;
        for (i, text) in texts.iter().enumerate() {
            let mut m = Move::new(i, Author::Student, *text, DesignPhase::Ideation)
                .with_timestamp(start + Duration::minutes(i as i64 * 3));
            m.embedding = Some(service.embed(text).await.unwrap().to_vec());
            store.append_move(id, &m).await.unwrap();
        }
    }

    async fn seeded_store() -> SqliteStorage {
        let store = SqliteStorage::new_in_memory().await.unwrap();
        seed(&store, "s-b", Arm::Control, Proficiency::Beginner, &STUDIO[..3]).await;
        seed(&store, "s-a", Arm::Mentor, Proficiency::Advanced, STUDIO).await;
        store
    }

    #[tokio::test]
    async fn test_tables_are_byte_identical_across_runs() {
        let store = seeded_store().await;
        let aggregator = MetricAggregator::new(SessionAnalyzer::default());

        let first_dir = TempDir::new().unwrap();
        let second_dir = TempDir::new().unwrap();
        let first = aggregator.run(&store, first_dir.path()).await.unwrap();
        let second = aggregator.run(&store, second_dir.path()).await.unwrap();

        assert_eq!(
            std::fs::read(&first.sessions).unwrap(),
            std::fs::read(&second.sessions).unwrap()
        );
        assert_eq!(
            std::fs::read(&first.aggregate).unwrap(),
            std::fs::read(&second.aggregate).unwrap()
        );
        assert!(first.sessions.ends_with(SESSION_TABLE));
        assert!(first.aggregate.ends_with(AGGREGATE_TABLE));
    }

    #[tokio::test]
    async fn test_session_rows_sorted_by_id() {
        let store = seeded_store().await;
        let dir = TempDir::new().unwrap();
        let paths = MetricAggregator::default()
            .run(&store, dir.path())
            .await
            .unwrap();

        let table = std::fs::read_to_string(&paths.sessions).unwrap();
        let ids: Vec<&str> = table
            .lines()
            .skip(1)
            .map(|line| line.split(',').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["s-a", "s-b"]);

        let row_a = table.lines().nth(1).unwrap();
        assert!(row_a.starts_with("s-a,mentor,advanced,0,6,15.000000,"));
    }

    #[tokio::test]
    async fn test_aggregate_header_and_sample_size() {
        let store = seeded_store().await;
        let dir = TempDir::new().unwrap();
        let paths = MetricAggregator::default()
            .run(&store, dir.path())
            .await
            .unwrap();

        let table = std::fs::read_to_string(&paths.aggregate).unwrap();
        let mut lines = table.lines();
        assert_eq!(
            lines.next().unwrap(),
            "metric_name,overall_avg,mentor_avg,generic_ai_avg,control_avg,\
             beginner_avg,intermediate_avg,advanced_avg,expert_avg,sample_size"
        );
        for line in lines {
            let cells: Vec<&str> = line.split(',').collect();
            assert_eq!(cells.len(), 10);
            assert_eq!(cells[9], "2");
            assert_eq!(cells[3], "", "no generic_ai sessions were stored");
        }
    }

    #[tokio::test]
    async fn test_empty_store_writes_headers_only() {
        let store = SqliteStorage::new_in_memory().await.unwrap();
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("tables");
        let paths = MetricAggregator::default().run(&store, &out).await.unwrap();

        let sessions = std::fs::read_to_string(&paths.sessions).unwrap();
        assert_eq!(sessions.lines().count(), 1);
        assert!(sessions.starts_with("session_id,arm,proficiency_level,"));

        let aggregate = std::fs::read_to_string(&paths.aggregate).unwrap();
        for line in aggregate.lines().skip(1) {
            assert!(line.ends_with(",,,,,,,,,0"), "unexpected row {}", line);
        }
    }

    #[tokio::test]
    async fn test_rerun_after_new_session_picks_it_up() {
        let store = seeded_store().await;
        let dir = TempDir::new().unwrap();
        let aggregator = MetricAggregator::default();
        aggregator.run(&store, dir.path()).await.unwrap();

        seed(&store, "s-c", Arm::GenericAi, Proficiency::Expert, &STUDIO[2..]).await;
        let paths = aggregator.run(&store, dir.path()).await.unwrap();
        let table = std::fs::read_to_string(&paths.sessions).unwrap();
        assert_eq!(table.lines().count(), 4);
        assert!(Utc::now() >= store.get_session("s-c").await.unwrap().unwrap().created_at);
    }
}
