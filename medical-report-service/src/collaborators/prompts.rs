use report_flow::Language;
use serde_json::{Value, json};

pub const EXTRACTION_PROMPT: &str =
    "Extract all text from this medical report document. Be as accurate as possible.";

pub fn analysis_prompt(text: &str) -> String {
    format!(
        "Analyze the following medical report text and provide a structured analysis. \
The target audience is a patient with little to no medical knowledge, so use simple and clear language.

Medical Report Text:
---
{}
---

Provide the analysis in the specified JSON format.",
        text
    )
}

pub fn translation_prompt(report_json: &str, target: Language) -> String {
    format!(
        "Translate all the string values in the following JSON object to {}. \
Keep the JSON structure and keys exactly the same.

JSON to translate:
---
{}
---

Return ONLY the translated JSON object.",
        target, report_json
    )
}

/// `responseSchema` shared by analysis and translation calls.
pub fn analysis_schema() -> Value {
    let list = |description: &str| {
        json!({
            "type": "ARRAY",
            "items": { "type": "STRING" },
            "description": description
        })
    };

    json!({
        "type": "OBJECT",
        "properties": {
            "simpleSummary": {
                "type": "STRING",
                "description": "A simple, one-paragraph summary of the report for a non-medical person."
            },
            "keyFindings": list("A bulleted list of the most important medical findings, problems, or diseases detected."),
            "possibleCauses": list("A bulleted list of possible causes or risk factors related to the key findings."),
            "cureAndCare": list("A bulleted list of general cure and care suggestions in simple, non-medical language."),
            "actionSteps": list("A bulleted list of recommended next steps for the patient.")
        },
        "required": ["simpleSummary", "keyFindings", "possibleCauses", "cureAndCare", "actionSteps"]
    })
}
