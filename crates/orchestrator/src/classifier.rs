//! Intent classification.
//!
//! One decide-mode backend call embedding the conversation history and the
//! actual date, parsed from a fixed two-line format, then run through the
//! deterministic override ladder in [`crate::rules`]. No retries: a failed
//! or unparseable call degrades to the text strategy instead of blocking
//! the reply.

use std::sync::Arc;

use tracing::{debug, warn};

use chatforge_core::{ClassificationResult, Clock, Intent, TextBackend, TextMode, TextRequest};

use crate::dates;
use crate::rules;

const DECIDE_MAX_TOKENS: u32 = 100;

/// Classifies a query into one of the four response strategies.
pub struct IntentClassifier {
    text: Arc<dyn TextBackend>,
    clock: Arc<dyn Clock>,
}

impl IntentClassifier {
    pub fn new(text: Arc<dyn TextBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { text, clock }
    }

    /// Classify `query` in the context of the user's conversation history.
    pub async fn classify(&self, query: &str, history: &str) -> ClassificationResult {
        let request = self.decide_request(query, history);

        let backend_result = match self.text.generate(request).await {
            Ok(raw) => parse_decision(&raw),
            Err(e) => {
                warn!(error = %e, "Decide call failed; defaulting to text strategy");
                ClassificationResult::fallback()
            }
        };

        let result = rules::apply_overrides(query, backend_result);
        debug!(intent = %result.intent, "Query classified");
        result
    }

    fn decide_request(&self, query: &str, history: &str) -> TextRequest {
        let date = dates::formatted_date(self.clock.as_ref());
        let year = dates::current_year(self.clock.as_ref());

        let prompt = format!(
            "IMPORTANT: Today's ACTUAL date is {date} and the CURRENT year is {year}.\n\n\
             Conversation context: \"{history}\"\n\
             Current query: \"{query}\"\n\n\
             First, extract all relevant subjects or details from the above information. \
             Pay special attention to:\n\
             - Names of people, places, or things\n\
             - Time periods or dates\n\
             - Specific questions or requests\n\
             - Any context from previous messages that helps understand the current query\n\n\
             Then, determine the most appropriate response type based on the query:\n\
             - If the query is asking for an image or visualization, choose \"image_request\"\n\
             - If the query is asking for information AND an image, choose \"hybrid_response\"\n\
             - If the query is about current events, recent developments, or time-sensitive \
             information, choose \"exa_response\"\n\
             - If the query contains words like \"current\", \"now\", \"today\", \"latest\", \
             \"present\", \"recent\", \"newest\", \"modern\", choose \"exa_response\"\n\
             - If the query is about historical facts, past events, or information that \
             doesn't change over time, choose \"text_response\"\n\
             - Otherwise, choose \"text_response\"\n\n\
             FORMAT YOUR RESPONSE EXACTLY LIKE THIS:\n\
             Extracted context: <the extracted subjects or details>\n\
             Response type: <text_response OR image_request OR exa_response OR hybrid_response>"
        );

        let system = format!(
            "You are an analysis assistant. Today's ACTUAL date is {date} and the CURRENT \
             year is {year}. Your task is to analyze queries and determine the most \
             appropriate response type. Be especially careful to:\n\
             1. Identify hybrid requests that ask a question AND request visualization\n\
             2. Route queries about current events, current officeholders, or anything that \
             might change over time to the exa_response type\n\
             3. Classify historical facts as text_response\n\
             4. Recognize when a query contains both an information request and an image \
             request, even if they're in separate sentences\n\
             5. Classify requests that ask to \"show\" something visual as image_request or \
             hybrid_response"
        );

        TextRequest::new(prompt, TextMode::Decide, DECIDE_MAX_TOKENS).with_system(system)
    }
}

/// Parse the fixed two-line decide format. Missing or unknown fields fall
/// back to safe defaults (empty context, text strategy) rather than erroring.
pub fn parse_decision(raw: &str) -> ClassificationResult {
    let mut extracted_context = String::new();
    let mut intent = None;

    for line in raw.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Extracted context:") {
            extracted_context = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("Response type:") {
            intent = Intent::from_wire(rest);
        }
    }

    ClassificationResult {
        extracted_context,
        intent: intent.unwrap_or(Intent::Text),
    }
}
