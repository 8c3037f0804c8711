use serde::{Deserialize, Serialize};

/// Router thresholds and the inadequate-response marker list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum pattern confidence for the precheck fastpath.
    #[serde(default = "d_precheck_min")]
    pub precheck_min_confidence: f64,

    /// Classifier confidence below this coerces `direct` to `plan`.
    #[serde(default = "d_classifier_min")]
    pub classifier_min_confidence: f64,

    /// Phrases that mark a responder answer as inadequate, matched
    /// case-insensitively. Tuned by tests, overridable from config.
    #[serde(default = "d_inadequate_markers")]
    pub inadequate_markers: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            precheck_min_confidence: d_precheck_min(),
            classifier_min_confidence: d_classifier_min(),
            inadequate_markers: d_inadequate_markers(),
        }
    }
}

fn d_precheck_min() -> f64 {
    0.8
}
fn d_classifier_min() -> f64 {
    0.5
}
fn d_inadequate_markers() -> Vec<String> {
    [
        "i don't have access to real-time",
        "i do not have access to real-time",
        "i cannot browse the internet",
        "i can't browse the internet",
        "as of my knowledge cutoff",
        "my training data only goes",
        "i'm unable to provide current",
        "i am unable to provide current",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
