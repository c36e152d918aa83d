//! Verified search: the verify-refine-retry loop.
//!
//! Search answers are unverified free text, so this module is the only
//! correctness gate between the search backend and the user. The loop:
//!
//! 1. Clean the query (image phrasing stripped, pronouns resolved from
//!    history), improve it for currency, and run the search.
//! 2. Grade the answer: an immediate structural precheck, then a dated
//!    VALID/INVALID relevance question to the text backend.
//! 3. On rejection, rewrite the query from the stated reason and retry the
//!    search exactly once.
//! 4. A second rejection still returns the answer, prefixed with an explicit
//!    disclaimer. A second-attempt answer is never dropped silently.
//!
//! The search backend is therefore invoked at most twice per top-level call.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use chatforge_core::{
    Clock, ImprovePurpose, SearchBackend, TextBackend, TextMode, TextRequest, VerificationOutcome,
};

use crate::dates;
use crate::rules;

/// Answers shorter than this are rejected without consulting the grader.
const MIN_ANSWER_LEN: usize = 20;

/// How much of the answer the grading prompt quotes.
const SNIPPET_LEN: usize = 500;

/// Prefix attached when the retried answer also fails verification.
pub const CURRENCY_DISCLAIMER: &str =
    "Note: this information may not be fully current.\n\n";

static UNCERTAINTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)I don't know|I'm not sure|I cannot|I can't provide").unwrap()
});

static NEEDS_CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:they|them|their|these|those|it|its|he|she|his|her)\b").unwrap()
});

static SUBJECT_OF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:draw|show|display|see|view|create|generate|make|picture|photo|image|visualization|drawing|sketch|illustrate|visualize|render|depict)(?:\s+\w+)?\s+(?:of|about)\s+([^?.,]+)",
    )
    .unwrap()
});

static SUBJECT_DIRECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:draw|show|display|see|view|create|generate|make|picture|photo|image|visualization|drawing|sketch|illustrate|visualize|render|depict)\s+(?:me\s+)?(?:(?:a|an|the)\s+)?([^?.,]+)",
    )
    .unwrap()
});

static TIME_CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:current|latest|recent|today|now|present|newest|modern)\b").unwrap()
});

static SUPERLATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:richest|poorest|biggest|smallest|tallest|shortest|fastest|slowest|oldest|youngest|best|worst)\b",
    )
    .unwrap()
});

/// Structural rejection before any grading call: empty/too-short answers and
/// stock uncertainty phrasing.
pub fn precheck(answer: &str) -> Option<VerificationOutcome> {
    if answer.len() < MIN_ANSWER_LEN {
        return Some(VerificationOutcome::invalid(
            "Response is too short or empty",
        ));
    }
    if UNCERTAINTY_RE.is_match(answer) {
        return Some(VerificationOutcome::invalid(
            "Response contains uncertainty phrases",
        ));
    }
    None
}

/// Parse the grader's leading VALID/INVALID token, case-insensitively.
/// Anything that does not start with INVALID counts as valid: a confused
/// grader must not suppress an answer.
pub fn parse_verdict(raw: &str) -> VerificationOutcome {
    let trimmed = raw.trim();
    let is_invalid = trimmed
        .get(.."INVALID".len())
        .is_some_and(|head| head.eq_ignore_ascii_case("INVALID"));

    if is_invalid {
        let reason = trimmed["INVALID".len()..]
            .trim_start_matches(':')
            .trim()
            .to_string();
        if reason.is_empty() {
            VerificationOutcome::invalid("No reason given")
        } else {
            VerificationOutcome::invalid(reason)
        }
    } else {
        VerificationOutcome::valid("Response is relevant and accurate")
    }
}

/// The search backend can only return information, so a query phrased as an
/// image request is rewritten into a dated information question about its
/// subject. Non-image queries pass through untouched.
pub fn reformulate_image_query(query: &str, formatted_date: &str) -> String {
    if !rules::image_intent(query) {
        return query.to_string();
    }

    let subject = SUBJECT_OF_RE
        .captures(query)
        .or_else(|| SUBJECT_DIRECT_RE.captures(query))
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default();

    if subject.is_empty() {
        return query.to_string();
    }

    let reformulated = if SUPERLATIVE_RE.is_match(&subject) {
        format!("What is the most current information about {subject} as of {formatted_date}?")
    } else if TIME_CONTEXT_RE.is_match(&subject) {
        format!("What is the most up-to-date information about {subject} as of {formatted_date}?")
    } else {
        format!("Who or what is {subject} as of {formatted_date}?")
    };

    debug!(query = %reformulated, "Reformulated image query into information query");
    reformulated
}

/// Whether the query leans on pronouns that need the conversation history to
/// resolve.
pub fn needs_context(query: &str) -> bool {
    NEEDS_CONTEXT_RE.is_match(query)
}

fn snippet(answer: &str) -> String {
    let truncated: String = answer.chars().take(SNIPPET_LEN).collect();
    if truncated.len() < answer.len() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

/// Search backend wrapped in the verification loop.
pub struct VerifiedSearch {
    text: Arc<dyn TextBackend>,
    search: Arc<dyn SearchBackend>,
    clock: Arc<dyn Clock>,
}

impl VerifiedSearch {
    pub fn new(
        text: Arc<dyn TextBackend>,
        search: Arc<dyn SearchBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            text,
            search,
            clock,
        }
    }

    /// Run the full verified search. `None` means no answer could be
    /// retrieved at all; the caller decides the fallback.
    pub async fn run(&self, query: &str, history: &str) -> Option<String> {
        let date = dates::formatted_date(self.clock.as_ref());
        let cleaned = reformulate_image_query(query, &date);

        let resolved = if needs_context(&cleaned) && !history.is_empty() {
            self.contextualize(&cleaned, history).await
        } else {
            cleaned
        };

        let first = self.prepared_search(&resolved).await?;
        let outcome = self.verify(&first, &resolved).await;
        if outcome.is_valid {
            return Some(first);
        }

        info!(reason = %outcome.reason, "Search answer rejected; refining query");
        let refined = self.refine(&resolved, &outcome.reason).await;

        let second = self.prepared_search(&refined).await?;
        let outcome = self.verify(&second, &refined).await;
        if outcome.is_valid {
            Some(second)
        } else {
            warn!(reason = %outcome.reason, "Retried answer still unverified; attaching disclaimer");
            Some(format!("{CURRENCY_DISCLAIMER}{second}"))
        }
    }

    /// One unverified search, still with query preparation. Used as the last
    /// fallback when the verified loop produced nothing.
    pub async fn direct(&self, query: &str) -> Option<String> {
        self.prepared_search(query).await
    }

    /// Improve the query for currency, ground its dates, and run the search.
    /// All failures collapse to `None`.
    async fn prepared_search(&self, query: &str) -> Option<String> {
        let improved = match self.text.improve_prompt(query, ImprovePurpose::Search).await {
            Ok(q) if !q.trim().is_empty() => q,
            Ok(_) => query.to_string(),
            Err(e) => {
                warn!(error = %e, "Query improvement failed; searching with the original");
                query.to_string()
            }
        };
        let grounded = dates::process_query(&improved, self.clock.as_ref());

        match self.search.search(&grounded).await {
            Ok(answer) if !answer.is_empty() => Some(answer),
            Ok(_) => {
                debug!("Search stream completed without content");
                None
            }
            Err(e) => {
                warn!(error = %e, "Search call failed");
                None
            }
        }
    }

    /// Grade one answer against its query. A grading failure assumes the
    /// answer is valid rather than discarding it.
    pub async fn verify(&self, answer: &str, query: &str) -> VerificationOutcome {
        if let Some(outcome) = precheck(answer) {
            return outcome;
        }

        let date = dates::formatted_date(self.clock.as_ref());
        let full_date = self.clock.now().to_rfc2822();

        let prompt = format!(
            "Query: \"{query}\"\n\
             Response: \"{}\"\n\n\
             IMPORTANT: Today's ACTUAL date is {date} in UTC timezone.\n\
             Full date: {full_date}\n\n\
             Is this response relevant to the query? Consider ONLY:\n\
             1. Does it directly address the main subject of the query?\n\
             2. Does it provide specific information related to the query?\n\
             3. Is the information accurate as of {date}?\n\n\
             Answer with VALID if the response is relevant and accurate, or INVALID \
             followed by a brief explanation of any issues.",
            snippet(answer)
        );
        let system = format!(
            "You are an evaluation assistant. Today's ACTUAL date is {date} in UTC \
             timezone. Your task is to verify if responses are relevant and accurate \
             as of that date, not as of your training data."
        );

        let request = TextRequest::new(prompt, TextMode::Generic, 100).with_system(system);
        match self.text.generate(request).await {
            Ok(raw) => parse_verdict(&raw),
            Err(e) => {
                warn!(error = %e, "Verification call failed; assuming the answer is valid");
                VerificationOutcome::valid("Verification unavailable")
            }
        }
    }

    /// Rewrite the query using the grader's stated failure reason. Falls back
    /// to the original query when the rewrite fails.
    async fn refine(&self, query: &str, reason: &str) -> String {
        let date = dates::formatted_date(self.clock.as_ref());
        let year = dates::current_year(self.clock.as_ref());

        let prompt = format!(
            "Original query: \"{query}\"\n\
             Feedback on previous response: \"{reason}\"\n\n\
             IMPORTANT: Today's ACTUAL date is {date} and the CURRENT year is {year}.\n\n\
             Please rewrite this query to be more specific, clear, and likely to get an \
             accurate response.\n\
             Make sure to:\n\
             1. Specify that you want information as of {date}\n\
             2. Clarify any ambiguous terms\n\
             3. Add specific details that would help get a better response\n\n\
             DO NOT add any disclaimers about knowledge cutoff dates or future events.\n\
             {date} is the CURRENT date, not a future date.\n\n\
             Improved query:"
        );
        let system = format!(
            "You are a query refinement specialist. Today's ACTUAL date is {date} and \
             the CURRENT year is {year}. Your task is to rewrite queries to get the \
             most accurate and relevant information as of the current date."
        );

        let request = TextRequest::new(prompt, TextMode::Generic, 100).with_system(system);
        match self.text.generate(request).await {
            Ok(refined) if !refined.trim().is_empty() => {
                dates::process_query(refined.trim(), self.clock.as_ref())
            }
            Ok(_) => query.to_string(),
            Err(e) => {
                warn!(error = %e, "Query refinement failed; retrying with the original");
                query.to_string()
            }
        }
    }

    /// Rewrite a pronoun-heavy query into a self-contained one using the
    /// conversation history. Falls back to the input on failure.
    async fn contextualize(&self, query: &str, history: &str) -> String {
        let date = dates::formatted_date(self.clock.as_ref());

        let prompt = format!(
            "Original query: \"{query}\"\n\
             Recent conversation context: \"{history}\"\n\n\
             IMPORTANT: Today's ACTUAL date is {date} in UTC timezone.\n\n\
             The original query contains references (like \"they\", \"them\", \"these\", \
             etc.) that require context from the conversation.\n\
             Please rewrite the query to be self-contained and explicit, replacing all \
             pronouns and references with their specific subjects.\n\
             Make the query clear and complete so it can be understood without any \
             additional context.\n\
             Include the current date in the query if it's asking about current \
             information.\n\n\
             IMPORTANT: The search backend can only provide information, not generate \
             or return images. Rewrite the query to ask only for information.\n\n\
             Rewritten query:"
        );
        let system = format!(
            "You are a query enhancement specialist. Today's ACTUAL date is {date} in \
             UTC timezone. Your task is to rewrite queries to be self-contained and \
             explicit, replacing all pronouns and references with their specific \
             subjects."
        );

        let request = TextRequest::new(prompt, TextMode::Generic, 150).with_system(system);
        match self.text.generate(request).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => rewritten.trim().to_string(),
            _ => query.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedSearch, ScriptedText};
    use chatforge_core::error::BackendError;
    use chatforge_core::ManualClock;
    use chrono::{TimeZone, Utc};

    const GOOD_ANSWER: &str = "The Eiffel Tower is 330 metres tall and located in Paris.";

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 8, 29, 10, 0, 0).unwrap(),
        ))
    }

    fn service(
        text: Vec<Result<String, BackendError>>,
        search: Vec<Result<String, BackendError>>,
    ) -> (VerifiedSearch, Arc<ScriptedText>, Arc<ScriptedSearch>) {
        let text = Arc::new(ScriptedText::new(text));
        let search = Arc::new(ScriptedSearch::new(search));
        let service = VerifiedSearch::new(text.clone(), search.clone(), clock());
        (service, text, search)
    }

    #[test]
    fn precheck_rejects_short_and_uncertain_answers() {
        assert!(!precheck("too short").unwrap().is_valid);
        assert!(!precheck("").unwrap().is_valid);
        assert!(
            !precheck("I'm not sure what you mean by that, could you clarify?")
                .unwrap()
                .is_valid
        );
        assert!(precheck(GOOD_ANSWER).is_none());
    }

    #[test]
    fn verdict_parsing_is_case_insensitive() {
        assert!(parse_verdict("VALID — looks accurate").is_valid);
        assert!(parse_verdict("valid").is_valid);

        let outcome = parse_verdict("INVALID: cites a 2023 officeholder");
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason, "cites a 2023 officeholder");

        assert!(!parse_verdict("invalid, the data is stale").is_valid);

        let outcome = parse_verdict("INVALID");
        assert!(!outcome.is_valid);
        assert_eq!(outcome.reason, "No reason given");
    }

    #[test]
    fn confused_verdict_counts_as_valid() {
        assert!(parse_verdict("I think this looks mostly fine?").is_valid);
        assert!(parse_verdict("").is_valid);
    }

    #[test]
    fn image_queries_become_information_questions() {
        let date = "August 29, 2026";

        let q = reformulate_image_query("draw a picture of the tallest building", date);
        assert_eq!(
            q,
            "What is the most current information about the tallest building as of August 29, 2026?"
        );

        let q = reformulate_image_query("show me the current president", date);
        assert_eq!(
            q,
            "What is the most up-to-date information about current president as of August 29, 2026?"
        );

        let q = reformulate_image_query("sketch a red panda", date);
        assert_eq!(q, "Who or what is red panda as of August 29, 2026?");

        // Non-image queries pass through untouched.
        let q = reformulate_image_query("who won the world cup", date);
        assert_eq!(q, "who won the world cup");
    }

    #[test]
    fn pronoun_queries_need_context() {
        assert!(needs_context("what do they eat"));
        assert!(needs_context("How tall is it?"));
        assert!(!needs_context("weather in Paris"));
    }

    #[tokio::test]
    async fn valid_first_answer_searches_once() {
        let (service, _, search) = service(
            vec![
                Ok("improved query".into()), // improve
                Ok("VALID".into()),          // verify
            ],
            vec![Ok(GOOD_ANSWER.into())],
        );

        let result = service.run("how tall is the eiffel tower", "").await;
        assert_eq!(result.as_deref(), Some(GOOD_ANSWER));
        assert_eq!(search.call_count(), 1);
    }

    #[tokio::test]
    async fn rejected_answer_refines_and_retries_once() {
        let (service, text, search) = service(
            vec![
                Ok("improved query".into()),             // improve #1
                Ok("INVALID: outdated numbers".into()),  // verify #1
                Ok("refined query".into()),              // refine
                Ok("improved refined query".into()),     // improve #2
                Ok("VALID".into()),                      // verify #2
            ],
            vec![
                Ok("An answer with outdated information in it.".into()),
                Ok(GOOD_ANSWER.into()),
            ],
        );

        let result = service.run("how tall is the eiffel tower", "").await;
        assert_eq!(result.as_deref(), Some(GOOD_ANSWER));
        assert_eq!(search.call_count(), 2);

        // The refinement prompt carried the grader's reason.
        let requests = text.requests();
        assert!(requests[2].prompt.contains("outdated numbers"));
    }

    #[tokio::test]
    async fn double_rejection_returns_disclaimed_answer() {
        let (service, _, search) = service(
            vec![
                Ok("improved query".into()),
                Ok("INVALID: stale".into()),
                Ok("refined query".into()),
                Ok("improved refined query".into()),
                Ok("INVALID: still stale".into()),
            ],
            vec![
                Ok("A first answer that is long enough to pass precheck.".into()),
                Ok("A second answer that is long enough to pass precheck.".into()),
            ],
        );

        let result = service.run("latest inflation figures", "").await.unwrap();
        assert!(result.starts_with(CURRENCY_DISCLAIMER));
        assert!(result.ends_with("A second answer that is long enough to pass precheck."));
        assert_eq!(search.call_count(), 2);
    }

    #[tokio::test]
    async fn no_search_data_returns_none() {
        let (service, text, search) = service(
            vec![Ok("improved query".into())],
            vec![Ok(String::new())],
        );

        let result = service.run("anything current", "").await;
        assert!(result.is_none());
        assert_eq!(search.call_count(), 1);
        // improve only; no verification call was made for an empty answer.
        assert_eq!(text.requests().len(), 1);
    }

    #[tokio::test]
    async fn short_answer_skips_grader_and_refines() {
        let (service, text, search) = service(
            vec![
                Ok("improved query".into()),         // improve #1
                Ok("refined query".into()),          // refine (precheck rejected)
                Ok("improved refined query".into()), // improve #2
                Ok("VALID".into()),                  // verify #2
            ],
            vec![Ok("nope".into()), Ok(GOOD_ANSWER.into())],
        );

        let result = service.run("latest news", "").await;
        assert_eq!(result.as_deref(), Some(GOOD_ANSWER));
        assert_eq!(search.call_count(), 2);
        assert_eq!(text.requests().len(), 4);
    }

    #[tokio::test]
    async fn pronouns_are_rewritten_from_history() {
        let (service, text, _) = service(
            vec![
                Ok("What do red pandas eat?".into()), // contextualize
                Ok("improved query".into()),          // improve
                Ok("VALID".into()),                   // verify
            ],
            vec![Ok(GOOD_ANSWER.into())],
        );

        let result = service
            .run("what do they eat", "User: tell me about red pandas")
            .await;
        assert!(result.is_some());

        let requests = text.requests();
        assert!(requests[0].prompt.contains("red pandas"));
        assert!(requests[0].prompt.contains("self-contained"));
    }

    #[tokio::test]
    async fn grader_failure_assumes_valid() {
        let (service, _, search) = service(
            vec![
                Ok("improved query".into()),
                Err(BackendError::Timeout("deadline".into())),
            ],
            vec![Ok(GOOD_ANSWER.into())],
        );

        let result = service.run("how tall is the eiffel tower", "").await;
        assert_eq!(result.as_deref(), Some(GOOD_ANSWER));
        assert_eq!(search.call_count(), 1);
    }
}
