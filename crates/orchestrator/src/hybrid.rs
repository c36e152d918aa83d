//! Hybrid reply composition: splitting a query into its information part and
//! building the grounded image-prompt enhancement request.
//!
//! The image part is always the whole query; only the search leg works on the
//! extracted prefix, so a bad split degrades to searching the full query
//! rather than losing anything.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Phrases that mark where the visual request begins. Earliest occurrence
/// wins.
const IMAGE_TRIGGER_WORDS: &[&str] = &[
    "imagine",
    "visualize",
    "picture",
    "envision",
    "show",
    "create an image",
    "what would it look like",
];

/// A usable information prefix has to be a real request, not a fragment.
const MIN_INFO_QUERY_LEN: usize = 10;

// Leftmost match semantics give the earliest trigger; matching the query
// directly keeps byte offsets valid on non-ASCII input.
static IMAGE_TRIGGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = IMAGE_TRIGGER_WORDS
        .iter()
        .map(|word| regex::escape(word))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){alternation}")).unwrap()
});

static TRAILING_CONJUNCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:and|then|also|plus)\s*$").unwrap());

static INFO_REQUEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\?|\b(?:who|what|when|where|why|how)\b|\btell me\b|\bdescribe\b|\bexplain\b")
        .unwrap()
});

/// Extract the information part of a hybrid query.
///
/// The text before the earliest image trigger word, with trailing
/// conjunctions trimmed, becomes the information query — but only when that
/// prefix is long enough and still reads like an information request.
/// Otherwise the full query is used for both legs.
pub fn split_information_query(query: &str) -> String {
    let Some(trigger) = IMAGE_TRIGGER_RE.find(query) else {
        return query.to_string();
    };

    let mut info = query[..trigger.start()].trim().to_string();
    loop {
        let trimmed = TRAILING_CONJUNCTION_RE.replace(&info, "").trim_end().to_string();
        if trimmed == info {
            break;
        }
        info = trimmed;
    }

    if info.len() < MIN_INFO_QUERY_LEN || !INFO_REQUEST_RE.is_match(&info) {
        return query.to_string();
    }

    debug!(info_query = %info, "Split hybrid query");
    info
}

/// Build the prompt that turns search grounding into a detailed image prompt.
pub fn image_enhancement_prompt(grounding: &str, query: &str, extracted_context: &str) -> String {
    format!(
        "Information from search: \"{grounding}\"\n\
         Original query: \"{query}\"\n\
         Extracted context: \"{extracted_context}\"\n\n\
         Based on the above information, create a detailed image prompt that would \
         generate a visually appealing and accurate image related to the query.\n\
         The prompt should:\n\
         1. Include specific details from the information provided\n\
         2. Be descriptive and visually oriented\n\
         3. Focus on the main subject of the query\n\
         4. Include relevant context, setting, and visual elements\n\
         5. Be formatted as a cohesive paragraph describing the scene\n\n\
         Begin with \"# Image Prompt:\" followed by a title, then provide the detailed \
         description."
    )
}

/// System instruction for the enhancement call.
pub const IMAGE_ENHANCEMENT_SYSTEM: &str =
    "You are an expert at creating detailed image generation prompts. Your task is to \
     take information and create a vivid, detailed prompt that will result in an \
     appealing and accurate image.";
