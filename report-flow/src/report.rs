use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Structured, plain-language analysis of a medical report.
///
/// Every field is required when deserializing; a model response missing one
/// of them is rejected rather than filled with defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub simple_summary: String,
    pub key_findings: Vec<String>,
    pub possible_causes: Vec<String>,
    pub cure_and_care: Vec<String>,
    /// Ordered as the steps should be taken.
    pub action_steps: Vec<String>,
}

/// Languages a report can be displayed in. English is always the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Hindi,
    Gujarati,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::Hindi, Language::Gujarati];

    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "Hindi",
            Language::Gujarati => "Gujarati",
        }
    }

    pub fn native_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Hindi => "हिन्दी",
            Language::Gujarati => "ગુજરાતી",
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Language::English)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLanguage(pub String);

impl fmt::Display for UnknownLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown language '{}', expected one of English, Hindi, Gujarati",
            self.0
        )
    }
}

impl std::error::Error for UnknownLanguage {}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Language::ALL
            .into_iter()
            .find(|lang| {
                lang.name().eq_ignore_ascii_case(trimmed) || lang.native_name() == trimmed
            })
            .ok_or_else(|| UnknownLanguage(trimmed.to_string()))
    }
}

/// A translated report together with the language it was translated into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedReport {
    pub language: Language,
    pub report: AnalysisReport,
}
