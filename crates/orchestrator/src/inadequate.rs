//! Inadequate-response detection.
//!
//! The responder holds back its opening window and checks it against a
//! marker list; a hit means the model punted ("I don't have access to
//! real-time…") and the turn deserves a replan with tools instead of a
//! shrug. Markers are configured (`router.inadequate_markers`) and
//! matched case-insensitively.

/// How much of the reply's head is scanned before tokens start
/// flowing to the caller.
pub const DETECTION_WINDOW_CHARS: usize = 256;

/// True when `text` starts with (or contains, within the detection
/// window) any marker phrase.
pub fn is_inadequate(text: &str, markers: &[String]) -> bool {
    let head: String = text
        .chars()
        .take(DETECTION_WINDOW_CHARS)
        .collect::<String>()
        .to_lowercase();
    markers.iter().any(|m| head.contains(m.as_str()))
}
