//! Integration tests for SQLite storage layer
//!
//! Tests database operations using an in-memory SQLite database.

use chrono::{Duration, Utc};
use serde_json::json;

use mentor_cogbench::config::{LinkographyConfig, MetricsConfig};
use mentor_cogbench::error::StorageError;
use mentor_cogbench::linkography::{Author, DesignPhase, Move, MoveType};
use mentor_cogbench::routing::Route;
use mentor_cogbench::session::{Arm, Interaction, Proficiency, SessionAnalyzer, SessionRecord};
use mentor_cogbench::storage::{SqliteStorage, Storage};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

async fn stored_session(storage: &SqliteStorage) -> SessionRecord {
    let session = SessionRecord::new(Arm::Mentor, Proficiency::Beginner, "riverside library");
    storage.create_session(&session).await.unwrap();
    session
}

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_session() {
        let storage = create_test_storage().await;
        let session = SessionRecord::new(Arm::GenericAi, Proficiency::Expert, "museum extension")
            .with_metadata(json!({"cohort": "spring"}));
        storage.create_session(&session).await.unwrap();

        let retrieved = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(retrieved.id, session.id);
        assert_eq!(retrieved.arm, Arm::GenericAi);
        assert_eq!(retrieved.proficiency, Proficiency::Expert);
        assert_eq!(retrieved.project_context, "museum extension");
        assert_eq!(retrieved.metadata, Some(json!({"cohort": "spring"})));
    }

    #[tokio::test]
    async fn test_get_nonexistent_session() {
        let storage = create_test_storage().await;
        let result = storage.get_session("nonexistent-id").await.unwrap();
        assert!(result.is_none(), "Should return None for nonexistent session");
    }

    #[tokio::test]
    async fn test_duplicate_session_id_rejected() {
        let storage = create_test_storage().await;
        let session = stored_session(&storage).await;
        assert!(storage.create_session(&session).await.is_err());
    }

    #[tokio::test]
    async fn test_list_sessions_sorted_by_id() {
        let storage = create_test_storage().await;
        for id in ["c", "a", "b"] {
            let session =
                SessionRecord::new(Arm::Control, Proficiency::Advanced, "").with_id(id);
            storage.create_session(&session).await.unwrap();
        }
        let ids: Vec<String> = storage
            .list_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_touch_session_updates_timestamp() {
        let storage = create_test_storage().await;
        let session = stored_session(&storage).await;
        let later = session.updated_at + Duration::minutes(5);

        storage.touch_session(&session.id, later).await.unwrap();
        let retrieved = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(retrieved.updated_at.timestamp(), later.timestamp());
    }

    #[tokio::test]
    async fn test_touch_missing_session_fails() {
        let storage = create_test_storage().await;
        let result = storage.touch_session("missing", Utc::now()).await;
        assert!(matches!(result, Err(StorageError::SessionNotFound { .. })));
    }
}

mod move_tests {
    use super::*;

    #[tokio::test]
    async fn test_moves_round_trip_in_index_order() {
        let storage = create_test_storage().await;
        let session = stored_session(&storage).await;

        let mut second = Move::new(1, Author::Tutor, "What would the reading room need?", DesignPhase::Ideation);
        second.embedding = Some(vec![0.5, -0.25, 0.0]);
        let first = Move::new(0, Author::Student, "I want a quiet reading room by the river", DesignPhase::Ideation);

        storage.append_move(&session.id, &second).await.unwrap();
        storage.append_move(&session.id, &first).await.unwrap();

        let moves = storage.get_moves(&session.id).await.unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].index, 0);
        assert_eq!(moves[0].author, Author::Student);
        assert_eq!(moves[0].embedding, None);
        assert_eq!(moves[1].author, Author::Tutor);
        assert_eq!(moves[1].move_type, MoveType::classify("What would the reading room need?"));
        assert_eq!(moves[1].embedding, Some(vec![0.5, -0.25, 0.0]));
    }

    #[tokio::test]
    async fn test_duplicate_move_index_rejected() {
        let storage = create_test_storage().await;
        let session = stored_session(&storage).await;
        let m = Move::new(0, Author::Student, "entrance on the north side", DesignPhase::Ideation);
        storage.append_move(&session.id, &m).await.unwrap();

        let again = Move::new(0, Author::Student, "entrance on the south side", DesignPhase::Ideation);
        assert!(storage.append_move(&session.id, &again).await.is_err());
    }

    #[tokio::test]
    async fn test_move_for_unknown_session_rejected() {
        let storage = create_test_storage().await;
        let m = Move::new(0, Author::Student, "orphan move", DesignPhase::Ideation);
        assert!(storage.append_move("no-such-session", &m).await.is_err());
    }
}

mod interaction_tests {
    use super::*;

    #[tokio::test]
    async fn test_interactions_round_trip_in_turn_order() {
        let storage = create_test_storage().await;
        let session = stored_session(&storage).await;

        for turn in [1usize, 0] {
            let mut interaction = Interaction::new(&session.id, turn, format!("message {}", turn));
            interaction.route = Some(Route::SocraticExploration);
            interaction.response_text = "Which view matters most to you?".to_string();
            storage.append_interaction(&interaction).await.unwrap();
        }

        let transcript = storage.get_interactions(&session.id).await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].turn, 0);
        assert_eq!(transcript[0].input_text, "message 0");
        assert_eq!(transcript[1].route, Some(Route::SocraticExploration));
    }

    #[tokio::test]
    async fn test_duplicate_turn_rejected() {
        let storage = create_test_storage().await;
        let session = stored_session(&storage).await;
        storage
            .append_interaction(&Interaction::new(&session.id, 0, "first"))
            .await
            .unwrap();
        assert!(storage
            .append_interaction(&Interaction::new(&session.id, 0, "again"))
            .await
            .is_err());
    }
}

mod artifact_tests {
    use super::*;

    #[tokio::test]
    async fn test_artifacts_keyed_by_content_hash() {
        let storage = create_test_storage().await;
        let session = stored_session(&storage).await;
        let moves = vec![Move::new(0, Author::Student, "a courtyard for the reading room", DesignPhase::Ideation)];
        let artifacts = SessionAnalyzer::default().derive(&session, &moves, &[]);

        storage.put_artifacts(&session.id, &artifacts).await.unwrap();

        let hit = storage
            .get_artifacts(&session.id, &artifacts.content_hash)
            .await
            .unwrap();
        assert_eq!(hit.map(|a| a.content_hash), Some(artifacts.content_hash.clone()));

        let stale = storage.get_artifacts(&session.id, "other-hash").await.unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn test_put_artifacts_replaces_previous_copy() {
        let storage = create_test_storage().await;
        let session = stored_session(&storage).await;
        let analyzer = SessionAnalyzer::default();

        let one = vec![Move::new(0, Author::Student, "stacks along the wall", DesignPhase::Ideation)];
        let first = analyzer.derive(&session, &one, &[]);
        storage.put_artifacts(&session.id, &first).await.unwrap();

        let mut two = one.clone();
        two.push(Move::new(1, Author::Student, "stacks form a spine", DesignPhase::Ideation));
        let second = analyzer.derive(&session, &two, &[]);
        storage.put_artifacts(&session.id, &second).await.unwrap();

        assert!(storage
            .get_artifacts(&session.id, &first.content_hash)
            .await
            .unwrap()
            .is_none());
        let current = storage
            .get_artifacts(&session.id, &second.content_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.metrics.move_count, 2);
    }

    #[tokio::test]
    async fn test_load_or_derive_caches_then_reuses() {
        let storage = create_test_storage().await;
        let session = stored_session(&storage).await;
        let m = Move::new(0, Author::Student, "a ramp up to the entrance", DesignPhase::Ideation);
        storage.append_move(&session.id, &m).await.unwrap();

        let analyzer = SessionAnalyzer::default();
        let (_, derived, _) = analyzer.load_or_derive(&storage, &session.id).await.unwrap();
        let cached = storage
            .get_artifacts(&session.id, &derived.content_hash)
            .await
            .unwrap();
        assert!(cached.is_some());

        let (_, again, _) = analyzer.load_or_derive(&storage, &session.id).await.unwrap();
        assert_eq!(again.content_hash, derived.content_hash);
        assert_eq!(again.cognitive, derived.cognitive);
    }

    #[tokio::test]
    async fn test_settings_change_rederives_artifacts() {
        let storage = create_test_storage().await;
        let session = stored_session(&storage).await;
        let mut first = Move::new(0, Author::Student, "a long reading room", DesignPhase::Ideation);
        first.embedding = Some(vec![1.0, 0.0]);
        let mut second = Move::new(1, Author::Student, "light from the river side", DesignPhase::Ideation);
        second.embedding = Some(vec![0.6, 0.8]);
        storage.append_move(&session.id, &first).await.unwrap();
        storage.append_move(&session.id, &second).await.unwrap();

        let (_, loose, _) = SessionAnalyzer::default()
            .load_or_derive(&storage, &session.id)
            .await
            .unwrap();
        assert_eq!(loose.linkograph.links.len(), 1);

        let strict = LinkographyConfig {
            similarity_threshold: 0.9,
            ..LinkographyConfig::default()
        };
        let (_, rederived, _) = SessionAnalyzer::new(&strict, MetricsConfig::default())
            .load_or_derive(&storage, &session.id)
            .await
            .unwrap();
        assert_ne!(rederived.content_hash, loose.content_hash);
        assert!(rederived.linkograph.links.is_empty());

        let cached = storage
            .get_artifacts(&session.id, &rederived.content_hash)
            .await
            .unwrap()
            .unwrap();
        assert!(cached.linkograph.links.is_empty());
    }

    #[tokio::test]
    async fn test_load_or_derive_missing_session() {
        let storage = create_test_storage().await;
        let result = SessionAnalyzer::default().load_or_derive(&storage, "ghost").await;
        assert!(result.is_err());
    }
}
