use thiserror::Error;

/// Failures that can occur while a report moves through the workflow.
///
/// The `Display` text of every variant is written for the end user: the
/// controller turns errors into the `last_error` string verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("API key is not configured. Please set the API_KEY environment variable.")]
    Configuration,

    #[error("Unsupported file type. Please upload a PDF, image, or text file.")]
    UnsupportedFileType(String),

    #[error("Could not extract any text from the file. Please try a clearer document.")]
    ExtractionEmpty,

    /// Network or model failure reported by a collaborator.
    #[error("{0}")]
    Collaborator(String),

    /// The model answered, but not in the agreed JSON shape.
    #[error("The AI returned an invalid {context} format. Please try again.")]
    MalformedResponse {
        context: &'static str,
        detail: String,
    },
}

impl WorkflowError {
    pub fn collaborator(message: impl Into<String>) -> Self {
        Self::Collaborator(message.into())
    }

    pub fn malformed(context: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            context,
            detail: detail.into(),
        }
    }

    /// Message shown to the user, or `fallback` when the failure carries none.
    pub fn user_message(&self, fallback: &str) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
