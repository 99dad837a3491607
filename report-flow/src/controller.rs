//! WorkflowController – owns one session's [`WorkflowState`] and sequences the
//! extract → analyze → translate calls.
//!
//! Every state change goes through [`WorkflowState::apply`] and is published on
//! a `tokio::sync::watch` channel, so a presentation layer can redraw on each
//! transition via [`WorkflowController::subscribe`].
//!
//! ## Stale results
//! Operations are not cancelled. Instead each operation that starts collaborator
//! work (`select_file`, a translating `change_language`) and every `reset`
//! advances a generation counter. Events tagged with an older generation are
//! dropped, including the final busy/status cleanup, so a slow response can
//! never overwrite the state of a newer operation.
//!
//! ## Starting work without awaiting it
//! [`WorkflowController::begin_analysis`] and
//! [`WorkflowController::begin_translation`] apply an operation's first
//! transition before returning, then hand back a job holding the collaborator
//! calls. A caller that spawns the job has already published the busy state by
//! the time it responds.
//!
//! `is_busy` is advisory. The controller does not serialize callers; the
//! presentation layer is expected to hold back new actions while it is set.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    collaborator::Collaborators,
    document::InputDocument,
    error::{Result, WorkflowError},
    report::{AnalysisReport, Language, TranslatedReport},
    state::{WorkflowEvent, WorkflowState},
};

const ANALYSIS_FALLBACK: &str = "An unknown error occurred during analysis.";
const TRANSLATION_FALLBACK: &str = "An unknown error occurred during translation.";

/// Configuration injected into a controller at construction time.
#[derive(Clone, Default)]
pub struct FlowConfig {
    pub api_key: Option<String>,
}

impl FlowConfig {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

impl fmt::Debug for FlowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub struct WorkflowController {
    config: FlowConfig,
    collaborators: Collaborators,
    state: watch::Sender<WorkflowState>,
    generation: AtomicU64,
}

impl WorkflowController {
    pub fn new(config: FlowConfig, collaborators: Collaborators) -> Self {
        let (state, _) = watch::channel(WorkflowState::default());
        Self {
            config,
            collaborators,
            state,
            generation: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.state.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().is_busy
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Wait until no operation is in flight and return that state.
    pub async fn settled(&self) -> WorkflowState {
        let mut receiver = self.subscribe();
        match receiver.wait_for(|state| !state.is_busy).await {
            Ok(state) => state.clone(),
            // The sender lives in `self`, so it cannot be gone while we borrow it.
            Err(_) => self.state(),
        }
    }

    /// Record `file` and run extraction followed by analysis.
    ///
    /// Failures never escape: they end up in `last_error`.
    pub async fn select_file(&self, file: InputDocument) {
        if let Some(job) = Self::begin_analysis(self, file) {
            job.run().await;
        }
    }

    /// Apply the first transition of [`select_file`](Self::select_file) now and
    /// return the collaborator work still to do, or `None` when there is none.
    ///
    /// Pass an `Arc<WorkflowController>` to get a `'static` job for
    /// `tokio::spawn`. Dropping the job without running it clears `is_busy`.
    pub fn begin_analysis<C>(controller: C, file: InputDocument) -> Option<AnalysisJob<C>>
    where
        C: Deref<Target = WorkflowController>,
    {
        let file = Arc::new(file);

        if !controller.config.is_configured() {
            warn!(file = %file.name, "Rejecting file, no API key configured");
            controller.begin(WorkflowEvent::ConfigurationMissing {
                file,
                error: WorkflowError::Configuration.to_string(),
            });
            return None;
        }

        let generation = controller.begin(WorkflowEvent::FileSelected(file.clone()));
        info!(
            file = %file.name,
            media_type = %file.media_type,
            size = file.size(),
            generation,
            "Starting report analysis"
        );

        Some(AnalysisJob {
            file,
            settle: SettleGuard {
                controller,
                generation,
            },
        })
    }

    async fn run_analysis(&self, generation: u64, file: &InputDocument) {
        match self.extract_and_analyze(generation, file).await {
            Ok(Some(report)) => {
                if self.dispatch(generation, WorkflowEvent::AnalysisCompleted(report)) {
                    info!(file = %file.name, "Report analysis completed");
                }
            }
            Ok(None) => debug!(generation, "Analysis superseded before completion"),
            Err(err) => {
                error!(file = %file.name, error = ?err, "Report analysis failed");
                self.dispatch(
                    generation,
                    WorkflowEvent::Failed(err.user_message(ANALYSIS_FALLBACK)),
                );
            }
        }
    }

    /// Returns `Ok(None)` when a newer operation took over after extraction.
    async fn extract_and_analyze(
        &self,
        generation: u64,
        file: &InputDocument,
    ) -> Result<Option<AnalysisReport>> {
        let text = self.collaborators.extractor.extract(file).await?;
        if text.trim().is_empty() {
            warn!(file = %file.name, "No text extracted from document");
            return Err(WorkflowError::ExtractionEmpty);
        }

        info!(characters = text.len(), "Text extracted, starting analysis");
        if !self.dispatch(generation, WorkflowEvent::TextExtracted) {
            return Ok(None);
        }

        self.collaborators.analyzer.analyze(&text).await.map(Some)
    }

    /// Switch the displayed language, translating when no cached copy exists.
    pub async fn change_language(&self, target: Language) {
        if let Some(job) = Self::begin_translation(self, target) {
            job.run().await;
        }
    }

    /// Apply the language switch now. Returns a job only when a translation
    /// call is needed; English and cached languages complete here.
    pub fn begin_translation<C>(controller: C, target: Language) -> Option<TranslationJob<C>>
    where
        C: Deref<Target = WorkflowController>,
    {
        let original = controller.prepare_language_change(target)?;

        let generation = controller.begin(WorkflowEvent::TranslationStarted(target));
        info!(language = %target, generation, "Translating report");

        Some(TranslationJob {
            original,
            target,
            settle: SettleGuard {
                controller,
                generation,
            },
        })
    }

    async fn run_translation(&self, generation: u64, original: &AnalysisReport, target: Language) {
        match self.collaborators.translator.translate(original, target).await {
            Ok(report) => {
                let translated = TranslatedReport {
                    language: target,
                    report,
                };
                if self.dispatch(generation, WorkflowEvent::TranslationCompleted(translated)) {
                    info!(language = %target, "Translation completed");
                }
            }
            Err(err) => {
                error!(language = %target, error = ?err, "Translation failed");
                self.dispatch(
                    generation,
                    WorkflowEvent::Failed(err.user_message(TRANSLATION_FALLBACK)),
                );
            }
        }
    }

    /// Apply the optimistic language switch. Returns the English report when a
    /// translation call is needed.
    fn prepare_language_change(&self, target: Language) -> Option<AnalysisReport> {
        let mut pending = None;
        self.state.send_if_modified(|state| {
            let Some(original) = state.original_analysis.as_ref() else {
                debug!(language = %target, "Ignoring language change, no analysis yet");
                return false;
            };

            if target.is_source() {
                debug!("Showing original English report");
            } else if state.cached_translation(target).is_some() {
                debug!(language = %target, "Reusing cached translation");
            } else {
                pending = Some(original.clone());
            }

            let changed = state.current_language != target;
            state.apply(WorkflowEvent::LanguageSelected(target));
            changed
        });
        pending
    }

    /// Return to the initial state. Any in-flight result is discarded.
    pub fn reset(&self) {
        let generation = self.begin(WorkflowEvent::Reset);
        info!(generation, "Workflow reset");
    }

    /// Start a new generation and apply its first event atomically.
    fn begin(&self, event: WorkflowEvent) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            state.apply(event);
        });
        generation
    }

    /// Apply `event` if `generation` is still the latest. Returns whether it was applied.
    fn dispatch(&self, generation: u64, event: WorkflowEvent) -> bool {
        self.state.send_if_modified(|state| {
            let current = self.generation.load(Ordering::SeqCst);
            if current != generation {
                debug!(generation, current, ?event, "Discarding stale workflow event");
                return false;
            }
            state.apply(event);
            true
        })
    }

    /// End the busy period of `generation` unless it already ended.
    fn settle(&self, generation: u64) {
        self.state.send_if_modified(|state| {
            if !state.is_busy || self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            state.apply(WorkflowEvent::Settled);
            true
        });
    }
}

/// Extraction and analysis for a file whose selection was already applied.
#[must_use = "the analysis only runs when the job is run"]
pub struct AnalysisJob<C: Deref<Target = WorkflowController>> {
    file: Arc<InputDocument>,
    settle: SettleGuard<C>,
}

impl<C: Deref<Target = WorkflowController>> AnalysisJob<C> {
    pub fn generation(&self) -> u64 {
        self.settle.generation
    }

    pub async fn run(self) {
        self.settle
            .controller
            .run_analysis(self.settle.generation, &self.file)
            .await;
    }
}

/// The translation call for a language switch that was already applied.
#[must_use = "the translation only runs when the job is run"]
pub struct TranslationJob<C: Deref<Target = WorkflowController>> {
    original: AnalysisReport,
    target: Language,
    settle: SettleGuard<C>,
}

impl<C: Deref<Target = WorkflowController>> TranslationJob<C> {
    pub fn generation(&self) -> u64 {
        self.settle.generation
    }

    pub async fn run(self) {
        self.settle
            .controller
            .run_translation(self.settle.generation, &self.original, self.target)
            .await;
    }
}

/// Clears the busy flag when an operation ends, however it ends.
struct SettleGuard<C: Deref<Target = WorkflowController>> {
    controller: C,
    generation: u64,
}

impl<C: Deref<Target = WorkflowController>> Drop for SettleGuard<C> {
    fn drop(&mut self) {
        self.controller.settle(self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{DocumentExtractor, ReportAnalyzer, ReportTranslator};
    use crate::document::MediaType;
    use crate::state::WorkflowPhase;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn anemia_report() -> AnalysisReport {
        AnalysisReport {
            simple_summary: "You have mild anemia.".to_string(),
            key_findings: vec!["Low hemoglobin".to_string()],
            possible_causes: vec!["Iron deficiency".to_string()],
            cure_and_care: vec!["Iron supplements".to_string()],
            action_steps: vec!["See a doctor".to_string()],
        }
    }

    /// Returns plain text verbatim and `ocr_text` for PDFs and images.
    struct FakeExtractor {
        ocr_text: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentExtractor for FakeExtractor {
        async fn extract(&self, document: &InputDocument) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &document.media_type {
                MediaType::PlainText => Ok(document.text_lossy()),
                MediaType::Other(mime) => Err(WorkflowError::UnsupportedFileType(mime.clone())),
                _ => Ok(self.ocr_text.clone()),
            }
        }
    }

    struct FakeAnalyzer {
        result: Result<AnalysisReport>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReportAnalyzer for FakeAnalyzer {
        async fn analyze(&self, _text: &str) -> Result<AnalysisReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct FakeTranslator {
        fail_with: Option<WorkflowError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReportTranslator for FakeTranslator {
        async fn translate(
            &self,
            report: &AnalysisReport,
            target: Language,
        ) -> Result<AnalysisReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            let mut translated = report.clone();
            translated.simple_summary = format!("[{}] {}", target, report.simple_summary);
            Ok(translated)
        }
    }

    struct Harness {
        controller: Arc<WorkflowController>,
        extractor: Arc<FakeExtractor>,
        analyzer: Arc<FakeAnalyzer>,
        translator: Arc<FakeTranslator>,
    }

    fn harness_with(
        config: FlowConfig,
        analysis: Result<AnalysisReport>,
        translation_error: Option<WorkflowError>,
    ) -> Harness {
        let extractor = Arc::new(FakeExtractor {
            ocr_text: "Patient has mild anemia.".to_string(),
            calls: AtomicUsize::new(0),
        });
        let analyzer = Arc::new(FakeAnalyzer {
            result: analysis,
            calls: AtomicUsize::new(0),
        });
        let translator = Arc::new(FakeTranslator {
            fail_with: translation_error,
            calls: AtomicUsize::new(0),
        });
        let collaborators =
            Collaborators::new(extractor.clone(), analyzer.clone(), translator.clone());
        Harness {
            controller: Arc::new(WorkflowController::new(config, collaborators)),
            extractor,
            analyzer,
            translator,
        }
    }

    fn harness() -> Harness {
        harness_with(FlowConfig::with_api_key("test-key"), Ok(anemia_report()), None)
    }

    fn pdf() -> InputDocument {
        InputDocument::new("report.pdf", b"%PDF-1.7 ...".to_vec(), Some("application/pdf"))
    }

    #[tokio::test]
    async fn pdf_upload_produces_analysis() {
        let h = harness();
        h.controller.select_file(pdf()).await;

        let state = h.controller.state();
        assert_eq!(state.original_analysis, Some(anemia_report()));
        assert!(!state.is_busy);
        assert!(state.status_message.is_empty());
        assert!(state.last_error.is_none());
        assert_eq!(state.phase, WorkflowPhase::Ready);
        assert_eq!(state.file_name(), Some("report.pdf"));
    }

    #[tokio::test]
    async fn every_supported_type_reaches_ready() {
        let inputs = [
            InputDocument::new("a.pdf", Vec::new(), Some("application/pdf")),
            InputDocument::new("a.png", Vec::new(), Some("image/png")),
            InputDocument::new("a.jpg", Vec::new(), Some("image/jpeg")),
            InputDocument::new("a.txt", b"Hb 9.8".to_vec(), Some("text/plain")),
        ];
        for input in inputs {
            let h = harness();
            h.controller.select_file(input).await;
            let state = h.controller.state();
            assert!(state.original_analysis.is_some());
            assert!(state.last_error.is_none());
            assert!(!state.is_busy);
        }
    }

    #[tokio::test]
    async fn unsupported_type_sets_error() {
        let h = harness();
        h.controller
            .select_file(InputDocument::new("scan.docx", b"PK".to_vec(), None))
            .await;

        let state = h.controller.state();
        assert!(state.original_analysis.is_none());
        assert_eq!(
            state.last_error.as_deref(),
            Some("Unsupported file type. Please upload a PDF, image, or text file.")
        );
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_text_file_skips_analysis() {
        let h = harness();
        h.controller
            .select_file(InputDocument::new("empty.txt", b"  \n\t".to_vec(), None))
            .await;

        let state = h.controller.state();
        assert!(state.original_analysis.is_none());
        assert!(
            state
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("Could not extract any text"))
        );
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);
        assert!(!state.is_busy);
        assert_eq!(state.phase, WorkflowPhase::Errored);
    }

    #[tokio::test]
    async fn malformed_analysis_is_reported() {
        let h = harness_with(
            FlowConfig::with_api_key("k"),
            Err(WorkflowError::malformed("analysis", "missing field `actionSteps`")),
            None,
        );
        h.controller.select_file(pdf()).await;

        let state = h.controller.state();
        assert_eq!(
            state.last_error.as_deref(),
            Some("The AI returned an invalid analysis format. Please try again.")
        );
        assert!(state.original_analysis.is_none());
    }

    #[tokio::test]
    async fn empty_collaborator_message_uses_generic_text() {
        let h = harness_with(
            FlowConfig::with_api_key("k"),
            Err(WorkflowError::collaborator("")),
            None,
        );
        h.controller.select_file(pdf()).await;
        assert_eq!(
            h.controller.state().last_error.as_deref(),
            Some(ANALYSIS_FALLBACK)
        );
    }

    #[tokio::test]
    async fn missing_api_key_records_file_without_work() {
        let h = harness_with(FlowConfig::default(), Ok(anemia_report()), None);
        h.controller.select_file(pdf()).await;

        let state = h.controller.state();
        assert_eq!(state.file_name(), Some("report.pdf"));
        assert_eq!(
            state.last_error.as_deref(),
            Some("API key is not configured. Please set the API_KEY environment variable.")
        );
        assert!(!state.is_busy);
        assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_api_key_counts_as_missing() {
        assert!(!FlowConfig::with_api_key("  ").is_configured());
        assert!(FlowConfig::with_api_key("abc").is_configured());
    }

    #[tokio::test]
    async fn language_change_without_analysis_is_ignored() {
        let h = harness();
        h.controller.change_language(Language::Hindi).await;

        assert_eq!(h.controller.state(), WorkflowState::default());
        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn english_never_calls_the_translator() {
        let h = harness();
        h.controller.change_language(Language::English).await;
        h.controller.select_file(pdf()).await;
        h.controller.change_language(Language::English).await;

        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.controller.state().current_language, Language::English);
    }

    #[tokio::test]
    async fn repeated_language_request_uses_cache() {
        let h = harness();
        h.controller.select_file(pdf()).await;

        h.controller.change_language(Language::Hindi).await;
        h.controller.change_language(Language::Hindi).await;

        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 1);
        let state = h.controller.state();
        assert_eq!(state.current_language, Language::Hindi);
        assert_eq!(
            state.displayed_report().map(|r| r.simple_summary.as_str()),
            Some("[Hindi] You have mild anemia.")
        );
    }

    #[tokio::test]
    async fn returning_to_a_cached_language_does_not_refetch() {
        let h = harness();
        h.controller.select_file(pdf()).await;

        h.controller.change_language(Language::Hindi).await;
        let cached = h.controller.state().translated_analysis;

        h.controller.change_language(Language::English).await;
        assert_eq!(h.controller.state().displayed_report(), Some(&anemia_report()));

        h.controller.change_language(Language::Hindi).await;
        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.controller.state().translated_analysis, cached);
    }

    #[tokio::test]
    async fn cache_holds_a_single_language() {
        let h = harness();
        h.controller.select_file(pdf()).await;

        h.controller.change_language(Language::Hindi).await;
        h.controller.change_language(Language::Gujarati).await;
        h.controller.change_language(Language::Hindi).await;

        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 3);
        let cached = h.controller.state().translated_analysis.unwrap();
        assert_eq!(cached.language, Language::Hindi);
    }

    #[tokio::test]
    async fn translation_failure_reverts_to_english() {
        let h = harness_with(
            FlowConfig::with_api_key("k"),
            Ok(anemia_report()),
            Some(WorkflowError::collaborator("Gemini API error 503")),
        );
        h.controller.select_file(pdf()).await;
        h.controller.change_language(Language::Hindi).await;

        let state = h.controller.state();
        assert_eq!(state.current_language, Language::English);
        assert_eq!(state.original_analysis, Some(anemia_report()));
        assert_eq!(state.last_error.as_deref(), Some("Gemini API error 503"));
        assert!(!state.is_busy);
        assert_eq!(state.phase, WorkflowPhase::Errored);
    }

    #[tokio::test]
    async fn new_file_clears_translation() {
        let h = harness();
        h.controller.select_file(pdf()).await;
        h.controller.change_language(Language::Hindi).await;

        h.controller.select_file(pdf()).await;
        let state = h.controller.state();
        assert!(state.translated_analysis.is_none());
        assert_eq!(state.current_language, Language::English);

        h.controller.change_language(Language::Hindi).await;
        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reset_restores_initial_state_and_is_idempotent() {
        let h = harness();
        h.controller.select_file(pdf()).await;
        h.controller.change_language(Language::Gujarati).await;

        h.controller.reset();
        let once = h.controller.state();
        h.controller.reset();

        assert_eq!(once, WorkflowState::default());
        assert_eq!(h.controller.state(), once);
    }

    /// Blocks extraction until released, to hold an operation in flight.
    struct GatedExtractor {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl DocumentExtractor for GatedExtractor {
        async fn extract(&self, _document: &InputDocument) -> Result<String> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("late text".to_string())
        }
    }

    fn gated_harness() -> (Arc<WorkflowController>, Arc<Notify>, Arc<Notify>, Arc<FakeAnalyzer>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let analyzer = Arc::new(FakeAnalyzer {
            result: Ok(anemia_report()),
            calls: AtomicUsize::new(0),
        });
        let collaborators = Collaborators::new(
            Arc::new(GatedExtractor {
                entered: entered.clone(),
                release: release.clone(),
            }),
            analyzer.clone(),
            Arc::new(FakeTranslator {
                fail_with: None,
                calls: AtomicUsize::new(0),
            }),
        );
        let controller = Arc::new(WorkflowController::new(
            FlowConfig::with_api_key("k"),
            collaborators,
        ));
        (controller, entered, release, analyzer)
    }

    #[tokio::test]
    async fn subscribers_observe_in_flight_phases() {
        let (controller, entered, release, _analyzer) = gated_harness();
        let mut receiver = controller.subscribe();

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.select_file(pdf()).await })
        };
        entered.notified().await;

        assert!(receiver.has_changed().unwrap());
        {
            let state = receiver.borrow_and_update();
            assert_eq!(state.phase, WorkflowPhase::Extracting);
            assert_eq!(state.status_message, crate::state::EXTRACTING_STATUS);
            assert!(state.is_busy);
        }

        release.notify_one();
        task.await.unwrap();

        receiver.changed().await.unwrap();
        let state = receiver.borrow_and_update();
        assert_eq!(state.phase, WorkflowPhase::Ready);
        assert!(!state.is_busy);
    }

    #[tokio::test]
    async fn reset_mid_flight_discards_late_result() {
        let (controller, entered, release, analyzer) = gated_harness();

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.select_file(pdf()).await })
        };
        entered.notified().await;
        assert!(controller.is_busy());

        controller.reset();
        assert_eq!(controller.state(), WorkflowState::default());

        release.notify_one();
        task.await.unwrap();

        assert_eq!(controller.state(), WorkflowState::default());
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropped_operation_still_clears_busy_flag() {
        let (controller, entered, _release, _analyzer) = gated_harness();

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.select_file(pdf()).await })
        };
        entered.notified().await;
        assert!(controller.is_busy());

        task.abort();
        let _ = task.await;

        let state = controller.state();
        assert!(!state.is_busy);
        assert!(state.status_message.is_empty());
    }

    #[tokio::test]
    async fn begun_analysis_is_visible_before_the_job_runs() {
        let h = harness();
        let job = WorkflowController::begin_analysis(h.controller.clone(), pdf())
            .expect("configured controller returns a job");

        let state = h.controller.state();
        assert!(state.is_busy);
        assert_eq!(state.phase, WorkflowPhase::Extracting);
        assert_eq!(state.file_name(), Some("report.pdf"));
        assert_eq!(job.generation(), h.controller.generation());
        assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);

        tokio::spawn(job.run()).await.unwrap();

        let state = h.controller.state();
        assert_eq!(state.phase, WorkflowPhase::Ready);
        assert_eq!(state.original_analysis, Some(anemia_report()));
        assert!(!state.is_busy);
    }

    #[tokio::test]
    async fn unrun_job_still_clears_busy_flag() {
        let h = harness();
        let job = WorkflowController::begin_analysis(h.controller.clone(), pdf()).unwrap();
        assert!(h.controller.is_busy());

        drop(job);

        let state = h.controller.state();
        assert!(!state.is_busy);
        assert!(state.status_message.is_empty());
        assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_key_begins_without_a_job() {
        let h = harness_with(FlowConfig::default(), Ok(anemia_report()), None);
        assert!(WorkflowController::begin_analysis(h.controller.clone(), pdf()).is_none());
        assert!(h.controller.state().last_error.is_some());
        assert!(!h.controller.is_busy());
    }

    #[tokio::test]
    async fn begun_translation_is_visible_before_the_job_runs() {
        let h = harness();
        h.controller.select_file(pdf()).await;

        let job = WorkflowController::begin_translation(h.controller.clone(), Language::Hindi)
            .expect("uncached language needs a translation");
        let state = h.controller.state();
        assert!(state.is_busy);
        assert_eq!(state.phase, WorkflowPhase::Translating(Language::Hindi));
        assert_eq!(state.current_language, Language::Hindi);
        assert_eq!(state.status_message, "Translating the report to Hindi...");

        job.run().await;
        assert!(!h.controller.is_busy());

        // English and the cached language finish without a job.
        assert!(WorkflowController::begin_translation(&*h.controller, Language::English).is_none());
        assert!(WorkflowController::begin_translation(&*h.controller, Language::Hindi).is_none());
        assert_eq!(h.controller.state().current_language, Language::Hindi);
        assert_eq!(h.translator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completion_is_published_already_settled() {
        let (controller, entered, release, _analyzer) = gated_harness();
        let mut receiver = controller.subscribe();

        let task = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.select_file(pdf()).await })
        };
        entered.notified().await;
        release.notify_one();

        let ready = receiver
            .wait_for(|state| state.phase == WorkflowPhase::Ready)
            .await
            .unwrap()
            .clone();
        assert!(!ready.is_busy);
        assert!(ready.status_message.is_empty());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn generation_advances_per_operation() {
        let h = harness();
        assert_eq!(h.controller.generation(), 0);
        h.controller.select_file(pdf()).await;
        assert_eq!(h.controller.generation(), 1);
        h.controller.change_language(Language::English).await;
        assert_eq!(h.controller.generation(), 1);
        h.controller.change_language(Language::Hindi).await;
        assert_eq!(h.controller.generation(), 2);
        h.controller.reset();
        assert_eq!(h.controller.generation(), 3);
    }
}
