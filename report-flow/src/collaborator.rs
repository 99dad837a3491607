use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    document::InputDocument,
    error::Result,
    report::{AnalysisReport, Language},
};

/// Turns an uploaded document into plain text.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract the text of `document`.
    ///
    /// Unsupported media types must fail with
    /// [`WorkflowError::UnsupportedFileType`](crate::WorkflowError::UnsupportedFileType).
    async fn extract(&self, document: &InputDocument) -> Result<String>;
}

/// Turns extracted report text into a structured [`AnalysisReport`].
#[async_trait]
pub trait ReportAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<AnalysisReport>;
}

/// Translates every text field of a report, keeping its structure.
#[async_trait]
pub trait ReportTranslator: Send + Sync {
    async fn translate(&self, report: &AnalysisReport, target: Language)
    -> Result<AnalysisReport>;
}

/// The three external capabilities the workflow depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn DocumentExtractor>,
    pub analyzer: Arc<dyn ReportAnalyzer>,
    pub translator: Arc<dyn ReportTranslator>,
}

impl Collaborators {
    pub fn new(
        extractor: Arc<dyn DocumentExtractor>,
        analyzer: Arc<dyn ReportAnalyzer>,
        translator: Arc<dyn ReportTranslator>,
    ) -> Self {
        Self {
            extractor,
            analyzer,
            translator,
        }
    }

    /// Use one value for all three roles, e.g. a single model client.
    pub fn from_shared<C>(client: Arc<C>) -> Self
    where
        C: DocumentExtractor + ReportAnalyzer + ReportTranslator + 'static,
    {
        Self {
            extractor: client.clone(),
            analyzer: client.clone(),
            translator: client,
        }
    }
}
