//! Workflow core for AI-assisted medical report analysis.
//!
//! A [`WorkflowController`] takes an uploaded [`InputDocument`] through text
//! extraction and structured analysis, and optionally translates the resulting
//! [`AnalysisReport`]. The three AI-backed steps are reached only through the
//! [`DocumentExtractor`], [`ReportAnalyzer`] and [`ReportTranslator`] traits, so
//! services plug in a real model client and tests plug in fakes.

pub mod collaborator;
pub mod controller;
pub mod document;
pub mod error;
pub mod report;
pub mod state;
pub mod storage;

// Re-export commonly used types
pub use collaborator::{Collaborators, DocumentExtractor, ReportAnalyzer, ReportTranslator};
pub use controller::{AnalysisJob, FlowConfig, TranslationJob, WorkflowController};
pub use document::{InputDocument, MediaType};
pub use error::{Result, WorkflowError};
pub use report::{AnalysisReport, Language, TranslatedReport, UnknownLanguage};
pub use state::{WorkflowEvent, WorkflowPhase, WorkflowState};
pub use storage::{InMemorySessionStorage, Session, SessionStorage};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    struct EchoClient;

    #[async_trait]
    impl DocumentExtractor for EchoClient {
        async fn extract(&self, document: &InputDocument) -> Result<String> {
            Ok(document.text_lossy())
        }
    }

    #[async_trait]
    impl ReportAnalyzer for EchoClient {
        async fn analyze(&self, text: &str) -> Result<AnalysisReport> {
            Ok(AnalysisReport {
                simple_summary: text.to_string(),
                key_findings: vec![],
                possible_causes: vec![],
                cure_and_care: vec![],
                action_steps: vec![],
            })
        }
    }

    #[async_trait]
    impl ReportTranslator for EchoClient {
        async fn translate(&self, report: &AnalysisReport, _target: Language) -> Result<AnalysisReport> {
            Ok(report.clone())
        }
    }

    #[tokio::test]
    async fn test_session_storage() {
        let storage = InMemorySessionStorage::new();
        let session = Session::new(
            FlowConfig::with_api_key("key"),
            Collaborators::from_shared(Arc::new(EchoClient)),
        );
        let id = session.id.clone();

        storage.save(session).await;
        assert_eq!(storage.list().await, vec![id.clone()]);

        let stored = storage.get(&id).await.expect("session stored");
        stored
            .controller
            .select_file(InputDocument::new("note.txt", b"Hb 11".to_vec(), None))
            .await;

        // Sessions share their controller, so the stored copy sees the update.
        let again = storage.get(&id).await.unwrap();
        assert_eq!(
            again.controller.state().displayed_report().map(|r| r.simple_summary.clone()),
            Some("Hb 11".to_string())
        );

        assert!(storage.delete(&id).await.is_some());
        assert!(storage.get(&id).await.is_none());
        assert!(storage.delete(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_evicted() {
        let storage = InMemorySessionStorage::new();
        let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 3600);
        let new_session = || {
            Session::new(
                FlowConfig::with_api_key("key"),
                Collaborators::from_shared(Arc::new(EchoClient)),
            )
        };

        let fresh = new_session();
        let mut stale = new_session();
        stale.created_at = two_hours_ago;
        let mut stale_busy = new_session();
        stale_busy.created_at = two_hours_ago;
        let _job = WorkflowController::begin_analysis(
            stale_busy.controller.clone(),
            InputDocument::new("note.txt", b"Hb 11".to_vec(), None),
        )
        .expect("configured session starts analysis");

        for session in [fresh.clone(), stale.clone(), stale_busy.clone()] {
            storage.save(session).await;
        }

        let evicted = storage.evict_expired(Duration::from_secs(3600)).await;
        assert_eq!(evicted, vec![stale.id.clone()]);
        assert!(storage.get(&stale.id).await.is_none());
        assert!(storage.get(&fresh.id).await.is_some());
        assert!(storage.get(&stale_busy.id).await.is_some());
    }
}
