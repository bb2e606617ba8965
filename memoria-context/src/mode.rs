//! Mode Detector (§4.H).
//!
//! Intent → mode mapping dominates when its confidence is at least 0.7;
//! otherwise query-text heuristics adjust the mode, falling back to
//! `GENERAL`.

use memoria_core::Mode;

const INTENT_MODE_TABLE: &[(&str, Mode)] = &[
    ("task", Mode::Task),
    ("implement", Mode::Task),
    ("fix", Mode::Task),
    ("build", Mode::Task),
    ("explore", Mode::Exploration),
    ("research", Mode::Exploration),
    ("debug", Mode::Debugging),
    ("investigate", Mode::Debugging),
    ("learn", Mode::Learning),
    ("teach", Mode::Learning),
    ("explain", Mode::Learning),
];

const DEBUG_VERBS: &[&str] = &["error", "exception", "crash", "fails", "failing", "traceback", "stack trace"];
const TASK_VERBS: &[&str] = &["implement", "fix", "build", "add", "create", "refactor"];
const EXPLORATION_VERBS: &[&str] = &["thinking", "wondering", "exploring", "considering", "what if"];
const TEACHING_VERBS: &[&str] = &["explain", "teach", "how does", "what is", "why does"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_ascii_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// Detect the interaction mode from the caller's `intent` and `query_text`
/// (§4.H). Returns `(mode, confidence)` with `confidence` in `[0, 1]`.
pub fn detect_mode(intent: &str, query_text: &str) -> (Mode, f32) {
    let intent_lower = intent.to_ascii_lowercase();
    for (keyword, mode) in INTENT_MODE_TABLE {
        if intent_lower.contains(keyword) {
            return (*mode, 0.9);
        }
    }

    if contains_any(query_text, DEBUG_VERBS) {
        return (Mode::Debugging, 0.6);
    }
    if contains_any(query_text, TASK_VERBS) {
        return (Mode::Task, 0.6);
    }
    if contains_any(query_text, EXPLORATION_VERBS) {
        return (Mode::Exploration, 0.55);
    }
    if contains_any(query_text, TEACHING_VERBS) {
        return (Mode::Learning, 0.55);
    }

    (Mode::General, 0.4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_intent_dominates_with_high_confidence() {
        let (mode, confidence) = detect_mode("fix the login bug", "anything");
        assert_eq!(mode, Mode::Task);
        assert!(confidence >= 0.7);
    }

    #[test]
    fn error_verbs_in_query_select_debugging() {
        let (mode, _) = detect_mode("", "why is this throwing an exception");
        assert_eq!(mode, Mode::Debugging);
    }

    #[test]
    fn exploratory_verbs_select_exploration() {
        let (mode, _) = detect_mode("", "just wondering what approaches exist here");
        assert_eq!(mode, Mode::Exploration);
    }

    #[test]
    fn teaching_verbs_select_learning() {
        let (mode, _) = detect_mode("", "can you explain how this works");
        assert_eq!(mode, Mode::Learning);
    }

    #[test]
    fn unmatched_input_falls_back_to_general() {
        let (mode, confidence) = detect_mode("", "");
        assert_eq!(mode, Mode::General);
        assert!(confidence < 0.7);
    }
}
