//! Deterministic classification override rules.
//!
//! The decide-mode backend is known to under-detect visual requests, so a
//! small ordered rule ladder gets the final word. Each rule is named so the
//! override shows up in logs, and the first matching rule wins.

use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use chatforge_core::{ClassificationResult, Intent};

static IMAGE_INTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \bshow\s+me\b
        | \b(?:show|display|see|view|create|generate|make)\s+an?\s+(?:image|picture|photo|visualization|drawing)\b
        | \b(?:image|picture|photo|visualization|drawing)s?\s+of\b
        | \b(?:draw|sketch|illustrate|visualize|render|depict)\b
        | \bpictures?\b | \bphotos?\b | \bvisuals?\b
        ",
    )
    .unwrap()
});

static INFO_CUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \?
        | \b(?:who|what|when|where|why|how)\b
        | \b(?:current|latest|recent|today|now)\b
        | \b(?:weather|information|data)\b
        | \b(?:richest|poorest|biggest|smallest|tallest|shortest)\b
        ",
    )
    .unwrap()
});

static CURRENCY_CUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:current(?:ly)?|now|today|latest|recent(?:ly)?)\b").unwrap()
});

/// True when the query lexically asks for something visual.
pub fn image_intent(query: &str) -> bool {
    IMAGE_INTENT_RE.is_match(query)
}

/// True when the query also seeks information (question mark, interrogative
/// word, or a lookup-domain word).
pub fn info_seeking(query: &str) -> bool {
    INFO_CUE_RE.is_match(query)
}

/// True when the query asks about the present moment.
pub fn currency_cue(query: &str) -> bool {
    CURRENCY_CUE_RE.is_match(query)
}

/// One override rule: a named predicate over (query, backend intent) and the
/// intent to force when it matches.
pub struct OverrideRule {
    pub name: &'static str,
    pub target: Intent,
    applies: fn(&str, Intent) -> bool,
}

/// The ladder, in precedence order.
pub const OVERRIDE_RULES: &[OverrideRule] = &[
    OverrideRule {
        name: "image-plus-info",
        target: Intent::Hybrid,
        applies: |query, _| image_intent(query) && info_seeking(query),
    },
    OverrideRule {
        name: "image-only",
        target: Intent::Image,
        applies: |query, _| image_intent(query),
    },
    OverrideRule {
        name: "time-sensitive-text",
        target: Intent::Search,
        applies: |query, backend| backend == Intent::Text && currency_cue(query),
    },
];

/// Run the ladder over a backend classification. The first matching rule
/// replaces the intent; the extracted context is kept either way.
pub fn apply_overrides(query: &str, mut result: ClassificationResult) -> ClassificationResult {
    for rule in OVERRIDE_RULES {
        if (rule.applies)(query, result.intent) {
            if result.intent != rule.target {
                info!(
                    rule = rule.name,
                    from = %result.intent,
                    to = %rule.target,
                    "Classification overridden"
                );
            }
            result.intent = rule.target;
            return result;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_says(intent: Intent) -> ClassificationResult {
        ClassificationResult {
            extracted_context: "ctx".into(),
            intent,
        }
    }

    #[test]
    fn draw_request_overrides_to_image() {
        let result = apply_overrides("draw a cat", backend_says(Intent::Text));
        assert_eq!(result.intent, Intent::Image);
        assert_eq!(result.extracted_context, "ctx");
    }

    #[test]
    fn image_plus_question_overrides_to_hybrid() {
        // Image cue plus an information cue, regardless of what the backend said.
        let result = apply_overrides(
            "show me a picture of the tallest building in the world",
            backend_says(Intent::Text),
        );
        assert_eq!(result.intent, Intent::Hybrid);

        let result = apply_overrides(
            "what does a quasar look like? render one",
            backend_says(Intent::Search),
        );
        assert_eq!(result.intent, Intent::Hybrid);
    }

    #[test]
    fn currency_cue_overrides_text_to_search() {
        let result = apply_overrides("what's the weather today", backend_says(Intent::Text));
        assert_eq!(result.intent, Intent::Search);
    }

    #[test]
    fn currency_cue_leaves_non_text_alone() {
        let result = apply_overrides(
            "latest headlines please",
            backend_says(Intent::Search),
        );
        assert_eq!(result.intent, Intent::Search);
    }

    #[test]
    fn plain_query_keeps_backend_intent() {
        let result = apply_overrides("tell me a joke", backend_says(Intent::Text));
        assert_eq!(result.intent, Intent::Text);
    }

    #[test]
    fn image_cues_need_word_boundaries() {
        // "pictures" is a cue; "picturesque" alone is not.
        assert!(image_intent("pictures of mountains"));
        assert!(!image_intent("a picturesque village"));
        assert!(!image_intent("withdraws from the account"));
    }
}
