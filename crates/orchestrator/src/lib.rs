//! Conversational orchestration: classify each inbound query, drive the
//! matching backend pipeline, and hand the assembled reply to delivery.
//!
//! The orchestrator is the only component that sees a whole turn. Every
//! backend failure inside a turn is absorbed into a degraded but valid
//! reply; nothing here returns an error to the gateway, because an
//! acknowledged chat message must always be answered.

pub mod classifier;
pub mod dates;
pub mod hybrid;
pub mod rules;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_support;

pub use classifier::IntentClassifier;
pub use verify::VerifiedSearch;

use std::sync::Arc;

use tracing::{error, info, warn};

use chatforge_backends::{poll_until_ready, Sleep, TokioSleep};
use chatforge_config::ImageBackendConfig;
use chatforge_context::ContextStore;
use chatforge_core::{
    Clock, Delivery, DeliveryTarget, ImageBackend, ImprovePurpose, Intent, ReplyPayload,
    SearchBackend, TextBackend, TextMode, TextRequest,
};

const NAME_PREFIX: &str = "my name is ";

const TEXT_APOLOGY: &str = "I'm sorry, but I couldn't generate a response at this time.";
const IMAGE_APOLOGY: &str = "I'm sorry, but I couldn't generate an image at this time.";
const SEARCH_APOLOGY: &str =
    "I'm sorry, but I couldn't retrieve current information at this time.";
const NO_INFO_PLACEHOLDER: &str = "I couldn't find specific information about that.";
const IMAGE_DELIVERY_APOLOGY: &str =
    "I'm sorry, but I couldn't deliver the generated image at this time.";

/// Drives one turn end to end: classification, backend pipeline, delivery,
/// history bookkeeping.
pub struct Orchestrator {
    text: Arc<dyn TextBackend>,
    image: Arc<dyn ImageBackend>,
    delivery: Arc<dyn Delivery>,
    store: Arc<ContextStore>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleep>,
    image_config: ImageBackendConfig,
    classifier: IntentClassifier,
    verified: VerifiedSearch,
}

impl Orchestrator {
    pub fn new(
        text: Arc<dyn TextBackend>,
        search: Arc<dyn SearchBackend>,
        image: Arc<dyn ImageBackend>,
        delivery: Arc<dyn Delivery>,
        store: Arc<ContextStore>,
        clock: Arc<dyn Clock>,
        image_config: ImageBackendConfig,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(text.clone(), clock.clone()),
            verified: VerifiedSearch::new(text.clone(), search, clock.clone()),
            text,
            image,
            delivery,
            store,
            clock,
            sleeper: Arc::new(TokioSleep),
            image_config,
        }
    }

    /// Replace the poll-loop sleeper (tests inject a non-waiting one).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleep>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Process one inbound message. Fire-and-forget from the caller's
    /// perspective: the inbound event was acknowledged before this runs, and
    /// every failure inside is absorbed into a fallback reply.
    pub async fn handle(&self, user_id: &str, raw_query: &str, target: &DeliveryTarget) {
        let query = raw_query.trim();
        if query.is_empty() {
            return;
        }

        if query.to_lowercase().starts_with(NAME_PREFIX) {
            let name = query[NAME_PREFIX.len()..].trim().to_string();
            info!(user_id, name = %name, "Registering user name");
            self.store.set_name(user_id, &name).await;
            let reply =
                ReplyPayload::text(format!("Thanks, I'll remember your name as {name}."));
            if let Err(e) = self.delivery.deliver(target, &reply).await {
                error!(error = %e, "Name confirmation delivery failed");
            }
            return;
        }

        self.store.append(user_id, format!("User: {query}")).await;

        let history = self.store.history(user_id).await;
        let classification = self.classifier.classify(query, &history).await;
        info!(user_id, intent = %classification.intent, "Dispatching turn");

        // Search legs get the date-grounded rendition; text and image prompts
        // keep the user's own words.
        let processed = dates::process_query(query, self.clock.as_ref());

        match classification.intent {
            Intent::Text => self.respond_text(user_id, query, target).await,
            Intent::Image => {
                self.respond_image(user_id, query, &classification.extracted_context, target)
                    .await
            }
            Intent::Search => {
                self.respond_search(user_id, &processed, &history, target).await
            }
            Intent::Hybrid => {
                self.respond_hybrid(
                    user_id,
                    &processed,
                    &history,
                    &classification.extracted_context,
                    target,
                )
                .await
            }
        }
    }

    async fn respond_text(&self, user_id: &str, query: &str, target: &DeliveryTarget) {
        let history = self.store.history(user_id).await;
        let user_name = self
            .store
            .display_name(user_id)
            .await
            .unwrap_or_else(|| "User".to_string());

        let prompt = format!(
            "Conversation history: \"{history}\"\n\
             Current query from {user_name}: \"{query}\"\n\n\
             Please provide a helpful, informative response to the current query, \
             taking into account the conversation history."
        );

        let text = match self
            .text
            .generate(TextRequest::new(prompt, TextMode::Answer, 500))
            .await
        {
            Ok(answer) if !answer.is_empty() => answer,
            Ok(_) => TEXT_APOLOGY.to_string(),
            Err(e) => {
                warn!(error = %e, "Text generation failed");
                TEXT_APOLOGY.to_string()
            }
        };

        self.send_and_record(user_id, target, ReplyPayload::text(text))
            .await;
    }

    async fn respond_image(
        &self,
        user_id: &str,
        query: &str,
        extracted_context: &str,
        target: &DeliveryTarget,
    ) {
        let base = if extracted_context.is_empty() {
            query
        } else {
            extracted_context
        };

        let prompt = match self.text.improve_prompt(base, ImprovePurpose::Image).await {
            Ok(p) if !p.trim().is_empty() => p,
            Ok(_) => base.to_string(),
            Err(e) => {
                warn!(error = %e, "Image prompt enhancement failed; using the base prompt");
                base.to_string()
            }
        };

        match self.generate_image(&prompt).await {
            Some(image_url) => {
                self.send_and_record(
                    user_id,
                    target,
                    ReplyPayload::Image {
                        image_url,
                        prompt_text: prompt,
                    },
                )
                .await;
            }
            None => {
                self.send_and_record(user_id, target, ReplyPayload::text(IMAGE_APOLOGY))
                    .await;
            }
        }
    }

    async fn respond_search(
        &self,
        user_id: &str,
        query: &str,
        history: &str,
        target: &DeliveryTarget,
    ) {
        let answer = match self.verified.run(query, history).await {
            Some(answer) => answer,
            None => {
                info!("Verified search produced nothing; falling back to a direct search");
                match self.verified.direct(query).await {
                    Some(answer) => answer,
                    None => SEARCH_APOLOGY.to_string(),
                }
            }
        };

        self.send_and_record(user_id, target, ReplyPayload::text(answer))
            .await;
    }

    async fn respond_hybrid(
        &self,
        user_id: &str,
        query: &str,
        history: &str,
        extracted_context: &str,
        target: &DeliveryTarget,
    ) {
        let info_query = hybrid::split_information_query(query);
        let grounding = self.verified.run(&info_query, history).await;
        let grounding_text = grounding
            .clone()
            .unwrap_or_else(|| "No specific information available".to_string());

        let enhancement = TextRequest::new(
            hybrid::image_enhancement_prompt(&grounding_text, query, extracted_context),
            TextMode::Generic,
            300,
        )
        .with_system(hybrid::IMAGE_ENHANCEMENT_SYSTEM);

        let image_prompt = match self.text.generate(enhancement).await {
            Ok(p) if !p.trim().is_empty() => p,
            _ => {
                if extracted_context.is_empty() {
                    query.to_string()
                } else {
                    extracted_context.to_string()
                }
            }
        };

        let reply_text = grounding.unwrap_or_else(|| NO_INFO_PLACEHOLDER.to_string());

        match self.generate_image(&image_prompt).await {
            Some(image_url) => {
                self.send_and_record(
                    user_id,
                    target,
                    ReplyPayload::Hybrid {
                        text: reply_text,
                        image_url,
                        prompt_text: image_prompt,
                    },
                )
                .await;
            }
            None => {
                // Image leg failed; the turn still answers with the text leg.
                warn!("Hybrid image generation failed; downgrading to text-only reply");
                self.send_and_record(user_id, target, ReplyPayload::text(reply_text))
                    .await;
            }
        }
    }

    /// Submit and poll one image job. All failures collapse to `None`.
    async fn generate_image(&self, prompt: &str) -> Option<String> {
        let job = match self
            .image
            .submit(prompt, self.image_config.width, self.image_config.height)
            .await
        {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "Image submission failed");
                return None;
            }
        };

        poll_until_ready(
            self.image.as_ref(),
            &job,
            &self.image_config.poll,
            self.sleeper.as_ref(),
        )
        .await
    }

    /// Deliver a payload and, on confirmed send, append its history entry.
    /// A failed image-bearing delivery is retried once as a text apology.
    async fn send_and_record(&self, user_id: &str, target: &DeliveryTarget, payload: ReplyPayload) {
        match self.delivery.deliver(target, &payload).await {
            Ok(()) => {
                self.store
                    .append(user_id, format!("Bot: {}", payload.history_entry()))
                    .await;
            }
            Err(e) if payload.has_image() => {
                warn!(error = %e, "Image delivery failed; retrying as text");
                let apology = ReplyPayload::text(IMAGE_DELIVERY_APOLOGY);
                match self.delivery.deliver(target, &apology).await {
                    Ok(()) => {
                        self.store
                            .append(user_id, format!("Bot: {}", apology.history_entry()))
                            .await;
                    }
                    Err(e) => error!(error = %e, "Fallback text delivery failed"),
                }
            }
            Err(e) => error!(error = %e, "Reply delivery failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{NoSleep, RecordingDelivery, ScriptedImage, ScriptedSearch, ScriptedText};
    use chatforge_core::error::BackendError;
    use chatforge_core::ManualClock;
    use chrono::{TimeZone, Utc};

    const GOOD_ANSWER: &str = "The Eiffel Tower is 330 metres tall and located in Paris.";

    struct Harness {
        orchestrator: Orchestrator,
        text: Arc<ScriptedText>,
        search: Arc<ScriptedSearch>,
        image: Arc<ScriptedImage>,
        delivery: Arc<RecordingDelivery>,
        store: Arc<ContextStore>,
    }

    fn harness(
        text_replies: Vec<Result<String, BackendError>>,
        search_replies: Vec<Result<String, BackendError>>,
        image: ScriptedImage,
        delivery: RecordingDelivery,
    ) -> Harness {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 8, 29, 10, 0, 0).unwrap(),
        ));
        let text = Arc::new(ScriptedText::new(text_replies));
        let search = Arc::new(ScriptedSearch::new(search_replies));
        let image = Arc::new(image);
        let delivery = Arc::new(delivery);
        let store = Arc::new(ContextStore::new(clock.clone(), 10, 24));

        let orchestrator = Orchestrator::new(
            text.clone(),
            search.clone(),
            image.clone(),
            delivery.clone(),
            store.clone(),
            clock,
            ImageBackendConfig::default(),
        )
        .with_sleeper(Arc::new(NoSleep));

        Harness {
            orchestrator,
            text,
            search,
            image,
            delivery,
            store,
        }
    }

    fn target() -> DeliveryTarget {
        DeliveryTarget {
            user_id: "u1".into(),
            conversation_id: "c1".into(),
            account_id: None,
        }
    }

    fn decide(context: &str, intent: &str) -> Result<String, BackendError> {
        Ok(format!(
            "Extracted context: {context}\nResponse type: {intent}"
        ))
    }

    #[tokio::test]
    async fn name_registration_short_circuits() {
        let h = harness(
            vec![],
            vec![],
            ScriptedImage::never_ready(),
            RecordingDelivery::default(),
        );

        h.orchestrator.handle("u1", "My name is Ada", &target()).await;

        let sent = h.delivery.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            ReplyPayload::text("Thanks, I'll remember your name as Ada.")
        );
        assert_eq!(h.store.display_name("u1").await.as_deref(), Some("Ada"));
        // Name registration is not part of the conversation history.
        assert!(h.store.history("u1").await.is_empty());
        // And no backend was consulted.
        assert!(h.text.requests().is_empty());
    }

    #[tokio::test]
    async fn text_turn_replies_and_records_history() {
        let h = harness(
            vec![
                decide("greeting", "text_response"),
                Ok("Hello! How can I help?".into()),
            ],
            vec![],
            ScriptedImage::never_ready(),
            RecordingDelivery::default(),
        );

        h.orchestrator
            .handle("u1", "hello there friend", &target())
            .await;

        let sent = h.delivery.sent();
        assert_eq!(sent, vec![ReplyPayload::text("Hello! How can I help?")]);

        let history = h.store.history("u1").await;
        assert!(history.contains("User: hello there friend"));
        assert!(history.contains("Bot: Hello! How can I help?"));
    }

    #[tokio::test]
    async fn currency_cue_routes_text_classification_to_search() {
        // The backend says plain text; "today" forces the search pipeline.
        let h = harness(
            vec![
                decide("weather", "text_response"),
                Ok("improved weather query".into()), // search improve
                Ok("VALID".into()),                  // verify
            ],
            vec![Ok(GOOD_ANSWER.into())],
            ScriptedImage::never_ready(),
            RecordingDelivery::default(),
        );

        h.orchestrator
            .handle("u1", "what's the weather today", &target())
            .await;

        // The search ran on the improved query, not the raw one.
        assert_eq!(h.search.queries(), vec!["improved weather query"]);
        assert_eq!(h.delivery.sent(), vec![ReplyPayload::text(GOOD_ANSWER)]);
    }

    #[tokio::test]
    async fn text_generation_failure_sends_apology() {
        let h = harness(
            vec![
                decide("", "text_response"),
                Err(BackendError::Timeout("deadline".into())),
            ],
            vec![],
            ScriptedImage::never_ready(),
            RecordingDelivery::default(),
        );

        h.orchestrator.handle("u1", "tell me a story", &target()).await;

        assert_eq!(h.delivery.sent(), vec![ReplyPayload::text(TEXT_APOLOGY)]);
    }

    #[tokio::test]
    async fn image_turn_sends_image_with_prompt_attribution() {
        let h = harness(
            vec![
                decide("", "text_response"), // override ladder forces image
                Ok("a detailed cat painting".into()),
            ],
            vec![],
            ScriptedImage::ready("https://img.example/cat.jpg"),
            RecordingDelivery::default(),
        );

        h.orchestrator.handle("u1", "draw a cat", &target()).await;

        assert_eq!(h.image.prompts(), vec!["a detailed cat painting"]);
        assert_eq!(
            h.delivery.sent(),
            vec![ReplyPayload::Image {
                image_url: "https://img.example/cat.jpg".into(),
                prompt_text: "a detailed cat painting".into(),
            }]
        );

        let history = h.store.history("u1").await;
        assert!(history.contains("[Generated image based on: \"a detailed cat painting\"]"));
    }

    #[tokio::test]
    async fn exhausted_polling_sends_image_apology() {
        let h = harness(
            vec![decide("", "text_response"), Ok("a prompt".into())],
            vec![],
            ScriptedImage::never_ready(),
            RecordingDelivery::default(),
        );

        h.orchestrator.handle("u1", "draw a cat", &target()).await;

        assert_eq!(h.delivery.sent(), vec![ReplyPayload::text(IMAGE_APOLOGY)]);
    }

    #[tokio::test]
    async fn failed_image_delivery_retries_as_text() {
        let h = harness(
            vec![decide("", "text_response"), Ok("a prompt".into())],
            vec![],
            ScriptedImage::ready("https://img.example/cat.jpg"),
            RecordingDelivery::rejecting_images(),
        );

        h.orchestrator.handle("u1", "draw a cat", &target()).await;

        // Only the text apology landed.
        assert_eq!(
            h.delivery.sent(),
            vec![ReplyPayload::text(IMAGE_DELIVERY_APOLOGY)]
        );
        let history = h.store.history("u1").await;
        assert!(history.contains(IMAGE_DELIVERY_APOLOGY));
    }

    #[tokio::test]
    async fn search_turn_falls_back_to_direct_search() {
        let h = harness(
            vec![
                decide("scores", "exa_response"),
                Ok("improved query".into()),        // improve (verified attempt)
                Ok("improved direct query".into()), // improve (direct fallback)
            ],
            vec![
                Err(BackendError::Network("connection reset".into())),
                Ok(GOOD_ANSWER.into()),
            ],
            ScriptedImage::never_ready(),
            RecordingDelivery::default(),
        );

        h.orchestrator
            .handle("u1", "latest football scores", &target())
            .await;

        assert_eq!(h.search.call_count(), 2);
        assert_eq!(h.delivery.sent(), vec![ReplyPayload::text(GOOD_ANSWER)]);
    }

    #[tokio::test]
    async fn search_turn_with_nothing_at_all_sends_apology() {
        let h = harness(
            vec![decide("scores", "exa_response")],
            vec![
                Err(BackendError::Network("down".into())),
                Err(BackendError::Network("still down".into())),
            ],
            ScriptedImage::never_ready(),
            RecordingDelivery::default(),
        );

        h.orchestrator
            .handle("u1", "latest football scores", &target())
            .await;

        assert_eq!(h.delivery.sent(), vec![ReplyPayload::text(SEARCH_APOLOGY)]);
    }

    #[tokio::test]
    async fn hybrid_turn_grounds_image_prompt_in_search_result() {
        let h = harness(
            vec![
                decide("Eiffel Tower, night", "hybrid_response"),
                Ok("improved info query".into()),            // improve
                Ok("VALID".into()),                          // verify
                Ok("# Image Prompt: Tower at night".into()), // enhancement
            ],
            vec![Ok(GOOD_ANSWER.into())],
            ScriptedImage::ready("https://img.example/tower.jpg"),
            RecordingDelivery::default(),
        );

        h.orchestrator
            .handle(
                "u1",
                "Tell me about the Eiffel Tower and then imagine it at night",
                &target(),
            )
            .await;

        // The search leg ran on the split information part only.
        let requests = h.text.requests();
        assert!(requests[1]
            .prompt
            .contains("Tell me about the Eiffel Tower"));
        assert!(!requests[1].prompt.contains("imagine"));

        // The enhancement call saw the search grounding.
        assert!(requests[3].prompt.contains(GOOD_ANSWER));

        assert_eq!(h.image.prompts(), vec!["# Image Prompt: Tower at night"]);
        assert_eq!(
            h.delivery.sent(),
            vec![ReplyPayload::Hybrid {
                text: GOOD_ANSWER.into(),
                image_url: "https://img.example/tower.jpg".into(),
                prompt_text: "# Image Prompt: Tower at night".into(),
            }]
        );

        let history = h.store.history("u1").await;
        assert!(history.contains("[with generated image]"));
    }

    #[tokio::test]
    async fn hybrid_downgrades_to_text_when_image_fails() {
        let h = harness(
            vec![
                decide("Eiffel Tower, night", "hybrid_response"),
                Ok("improved info query".into()),
                Ok("VALID".into()),
                Ok("# Image Prompt: Tower at night".into()),
            ],
            vec![Ok(GOOD_ANSWER.into())],
            ScriptedImage::submit_fails(),
            RecordingDelivery::default(),
        );

        h.orchestrator
            .handle(
                "u1",
                "Tell me about the Eiffel Tower and then imagine it at night",
                &target(),
            )
            .await;

        assert_eq!(h.delivery.sent(), vec![ReplyPayload::text(GOOD_ANSWER)]);
    }

    #[tokio::test]
    async fn empty_query_is_ignored() {
        let h = harness(
            vec![],
            vec![],
            ScriptedImage::never_ready(),
            RecordingDelivery::default(),
        );

        h.orchestrator.handle("u1", "   ", &target()).await;

        assert!(h.delivery.sent().is_empty());
        assert!(h.text.requests().is_empty());
    }
}
