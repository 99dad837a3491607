use chrono::{DateTime, Utc};
use report_flow::{AnalysisReport, Language, Session, WorkflowPhase, WorkflowState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct LanguageRequest {
    pub language: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

/// What a client needs to render one session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub phase: String,
    pub translating_to: Option<Language>,
    pub is_busy: bool,
    pub status_message: Option<String>,
    pub last_error: Option<String>,
    pub file_name: Option<String>,
    pub media_type: Option<String>,
    pub current_language: Language,
    pub translation_available: bool,
    pub translated_language: Option<Language>,
    /// The report in the language currently displayed.
    pub report: Option<AnalysisReport>,
}

impl SessionResponse {
    pub fn new(session: &Session, state: &WorkflowState) -> Self {
        let translating_to = match state.phase {
            WorkflowPhase::Translating(language) => Some(language),
            _ => None,
        };

        Self {
            session_id: session.id.clone(),
            created_at: DateTime::<Utc>::from(session.created_at),
            phase: state.phase.name().to_string(),
            translating_to,
            is_busy: state.is_busy,
            status_message: Some(state.status_message.clone()).filter(|m| !m.is_empty()),
            last_error: state.last_error.clone(),
            file_name: state.file_name().map(str::to_string),
            media_type: state
                .selected_file
                .as_ref()
                .map(|file| file.media_type.to_string()),
            current_language: state.current_language,
            translation_available: state.is_translation_available(),
            translated_language: state
                .translated_analysis
                .as_ref()
                .map(|translated| translated.language),
            report: state.displayed_report().cloned(),
        }
    }
}
