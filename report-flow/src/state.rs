//! Workflow state and the single reducer that moves it between phases.
//!
//! ```text
//! Idle ──select──▶ Extracting ──text──▶ Analyzing ──report──▶ Ready
//!                      │                    │                  │  ▲
//!                      └──────failure───────┴──▶ Errored       │  │
//!                                                  ▲   translate  success
//!                                                  │       ▼      │
//!                                                  └─── Translating
//! ```
//!
//! `Ready` and `Errored` are settled: entering them clears `is_busy` and the
//! status message, a new file selection restarts at `Extracting` from either
//! of them, and reset returns to `Idle` from anywhere.

use serde::Serialize;
use std::sync::Arc;

use crate::{
    document::InputDocument,
    report::{AnalysisReport, Language, TranslatedReport},
};

pub const EXTRACTING_STATUS: &str = "Extracting text from your report...";
pub const ANALYZING_STATUS: &str = "Analyzing your report with AI...";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "language", rename_all = "snake_case")]
pub enum WorkflowPhase {
    #[default]
    Idle,
    Extracting,
    Analyzing,
    Translating(Language),
    Ready,
    Errored,
}

impl WorkflowPhase {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowPhase::Idle => "idle",
            WorkflowPhase::Extracting => "extracting",
            WorkflowPhase::Analyzing => "analyzing",
            WorkflowPhase::Translating(_) => "translating",
            WorkflowPhase::Ready => "ready",
            WorkflowPhase::Errored => "errored",
        }
    }

    /// No collaborator call is in flight for this phase.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            WorkflowPhase::Idle | WorkflowPhase::Ready | WorkflowPhase::Errored
        )
    }

    pub fn status_message(&self) -> String {
        match self {
            WorkflowPhase::Extracting => EXTRACTING_STATUS.to_string(),
            WorkflowPhase::Analyzing => ANALYZING_STATUS.to_string(),
            WorkflowPhase::Translating(language) => {
                format!("Translating the report to {}...", language)
            }
            _ => String::new(),
        }
    }
}

/// Everything the presentation layer needs to render one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowState {
    pub selected_file: Option<Arc<InputDocument>>,
    /// The English analysis, once it has succeeded.
    pub original_analysis: Option<AnalysisReport>,
    /// Single cached translation; replaced whenever another language is fetched.
    pub translated_analysis: Option<TranslatedReport>,
    pub current_language: Language,
    pub is_busy: bool,
    pub status_message: String,
    pub last_error: Option<String>,
    pub phase: WorkflowPhase,
}

/// Transitions the controller dispatches into [`WorkflowState::apply`].
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A file was chosen but no credential is configured.
    ConfigurationMissing {
        file: Arc<InputDocument>,
        error: String,
    },
    FileSelected(Arc<InputDocument>),
    TextExtracted,
    AnalysisCompleted(AnalysisReport),
    LanguageSelected(Language),
    TranslationStarted(Language),
    TranslationCompleted(TranslatedReport),
    Failed(String),
    /// The in-flight operation finished, whatever its outcome.
    Settled,
    Reset,
}

impl WorkflowState {
    pub fn apply(&mut self, event: WorkflowEvent) {
        match event {
            WorkflowEvent::ConfigurationMissing { file, error } => {
                self.selected_file = Some(file);
                self.last_error = Some(error);
                self.is_busy = false;
                self.status_message.clear();
                self.phase = WorkflowPhase::Errored;
            }
            WorkflowEvent::FileSelected(file) => {
                *self = WorkflowState {
                    selected_file: Some(file),
                    is_busy: true,
                    ..WorkflowState::default()
                };
                self.enter(WorkflowPhase::Extracting);
            }
            WorkflowEvent::TextExtracted => self.enter(WorkflowPhase::Analyzing),
            WorkflowEvent::AnalysisCompleted(report) => {
                self.original_analysis = Some(report);
                self.last_error = None;
                self.enter(WorkflowPhase::Ready);
            }
            WorkflowEvent::LanguageSelected(language) => self.current_language = language,
            WorkflowEvent::TranslationStarted(language) => {
                self.is_busy = true;
                self.last_error = None;
                self.enter(WorkflowPhase::Translating(language));
            }
            WorkflowEvent::TranslationCompleted(translated) => {
                self.translated_analysis = Some(translated);
                self.last_error = None;
                self.enter(WorkflowPhase::Ready);
            }
            WorkflowEvent::Failed(message) => {
                if matches!(self.phase, WorkflowPhase::Translating(_)) {
                    self.current_language = Language::English;
                }
                self.last_error = Some(message);
                self.enter(WorkflowPhase::Errored);
            }
            WorkflowEvent::Settled => {
                self.is_busy = false;
                self.status_message.clear();
            }
            WorkflowEvent::Reset => *self = WorkflowState::default(),
        }
    }

    /// Move to `phase`. Entering a settled phase also ends the busy period, so
    /// no snapshot shows a finished phase that still looks in flight.
    fn enter(&mut self, phase: WorkflowPhase) {
        if phase.is_settled() {
            self.is_busy = false;
            self.status_message.clear();
        } else {
            self.status_message = phase.status_message();
        }
        self.phase = phase;
    }

    pub fn cached_translation(&self, language: Language) -> Option<&AnalysisReport> {
        self.translated_analysis
            .as_ref()
            .filter(|cached| cached.language == language)
            .map(|cached| &cached.report)
    }

    /// The report the user should currently see.
    pub fn displayed_report(&self) -> Option<&AnalysisReport> {
        if !self.current_language.is_source() {
            if let Some(report) = self.cached_translation(self.current_language) {
                return Some(report);
            }
        }
        self.original_analysis.as_ref()
    }

    pub fn is_translation_available(&self) -> bool {
        self.translated_analysis.is_some()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.selected_file.as_deref().map(|file| file.name.as_str())
    }
}
