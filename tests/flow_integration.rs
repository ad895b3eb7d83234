//! End-to-end flow scenarios against stub collaborators.
//!
//! Every test drives a real `FlowController` through inbound messages and
//! inspects what the stub transport recorded and what the session holds.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use intake_bot::channels::{ChatTransport, FileRef, InboundMessage};
use intake_bot::config::UploadLimits;
use intake_bot::error::{ChannelError, DeliverableError, ExtractionError, LlmError};
use intake_bot::extraction::DocumentExtractor;
use intake_bot::flow::{
    ConfirmationSubject, ContentType, DeliverableRenderer, FlowController, FlowDeps,
    MessageDispatcher, PlainTextPolicyRenderer, PriceQuote, RenderedDeliverable, prompts,
};
use intake_bot::llm::extract_tool::ExtractArgs;
use intake_bot::llm::{AgentReply, ConversationalAgent, ExtractDocumentTool};
use intake_bot::session::{
    DocumentFields, DocumentKind, DocumentValue, Session, SessionStore, Step,
};

const USER: &str = "u1";

// ── Stubs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text(String),
    File { name: String, bytes: Vec<u8> },
}

/// Records everything sent. File refs starting with `expired` fail to resolve.
/// Blank texts are refused like Telegram does, and so is any text containing
/// `fail_on`.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    fail_on: Mutex<Option<String>>,
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_message(&self, _user_id: &str, text: &str) -> Result<(), ChannelError> {
        let refused = match self.fail_on.lock().unwrap().as_deref() {
            Some(needle) => text.contains(needle),
            None => false,
        };
        if text.trim().is_empty() || refused {
            return Err(ChannelError::SendFailed {
                name: "recording".to_string(),
                reason: "Bad Request: message text is empty or refused".to_string(),
            });
        }
        self.sent.lock().unwrap().push(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn send_file(
        &self,
        _user_id: &str,
        bytes: Vec<u8>,
        file_name: &str,
        _caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent::File {
            name: file_name.to_string(),
            bytes,
        });
        Ok(())
    }

    async fn resolve_file_url(&self, file: &FileRef) -> Result<String, ChannelError> {
        if file.file_id.starts_with("expired") {
            return Err(ChannelError::FileUnavailable {
                file_id: file.file_id.clone(),
                reason: "file is too old".to_string(),
            });
        }
        Ok(format!("https://files.test/{}", file.file_id))
    }
}

/// Extraction service stub returning fixed fields per document kind.
struct StubExtractor {
    fail: bool,
    calls: AtomicUsize,
}

impl StubExtractor {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentExtractor for StubExtractor {
    async fn extract(
        &self,
        _file_url: &str,
        kind: DocumentKind,
    ) -> Result<DocumentFields, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ExtractionError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(match kind {
            DocumentKind::Passport => [("surname", "Doe"), ("given_names", "Jane")]
                .into_iter()
                .collect(),
            DocumentKind::VehicleRegistration => {
                [("registration_number", "AB1234"), ("make", "Toyota")]
                    .into_iter()
                    .collect()
            }
        })
    }
}

/// Agent stub. Extraction prompts run the real extraction tool unless
/// `skip_tool` is set; every other prompt pops the next scripted raw reply.
struct StubAgent {
    fail: bool,
    skip_tool: AtomicBool,
    tool: ExtractDocumentTool,
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl StubAgent {
    fn script(&self, raw: &str) {
        self.replies.lock().unwrap().push_back(raw.to_string());
    }

    fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn next_reply(&self) -> String {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "Okay.".to_string())
    }
}

fn between(haystack: &str, start: &str, end: &str) -> String {
    let from = haystack.find(start).unwrap() + start.len();
    let rest = &haystack[from..];
    rest[..rest.find(end).unwrap()].to_string()
}

#[async_trait]
impl ConversationalAgent for StubAgent {
    async fn run(
        &self,
        transcript: &[intake_bot::session::TranscriptEntry],
        prompt: &str,
    ) -> Result<AgentReply, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(LlmError::RequestFailed {
                provider: "stub".to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let extraction = prompt.contains("Call the extract_document tool");
        let raw = if extraction && !self.skip_tool.load(Ordering::SeqCst) {
            let args = ExtractArgs {
                user_id: between(prompt, "user_id \"", "\""),
                file_url: between(prompt, "File URL: ", "\n"),
                document_kind: between(prompt, "document_kind \"", "\""),
            };
            match self.tool.extract_into_session(args).await {
                Ok(_) => "Here is what I found. Is it correct?".to_string(),
                Err(_) => "Sorry, I couldn't read that photo. [EXTRACTION_FAILED]".to_string(),
            }
        } else {
            self.next_reply()
        };
        Ok(AgentReply::from_raw(transcript, prompt, &raw))
    }
}

/// Fails the first render, then delegates to the plain-text renderer.
#[derive(Default)]
struct FlakyRenderer {
    calls: AtomicUsize,
}

impl DeliverableRenderer for FlakyRenderer {
    fn render(
        &self,
        session: &Session,
        quote: &PriceQuote,
    ) -> Result<RenderedDeliverable, DeliverableError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(DeliverableError::Render("template engine offline".to_string()));
        }
        PlainTextPolicyRenderer.render(session, quote)
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    controller: Arc<FlowController>,
    store: Arc<SessionStore>,
    transport: Arc<RecordingTransport>,
    agent: Arc<StubAgent>,
    extractor: Arc<StubExtractor>,
}

fn harness_with(
    agent_fails: bool,
    extractor_fails: bool,
    renderer: Arc<dyn DeliverableRenderer>,
) -> Harness {
    let store = Arc::new(SessionStore::new());
    let transport = Arc::new(RecordingTransport::default());
    let extractor = Arc::new(StubExtractor::new(extractor_fails));
    let agent = Arc::new(StubAgent {
        fail: agent_fails,
        skip_tool: AtomicBool::new(false),
        tool: ExtractDocumentTool::new(Arc::clone(&store), extractor.clone()),
        replies: Mutex::new(VecDeque::new()),
        prompts: Mutex::new(Vec::new()),
    });

    let controller = Arc::new(FlowController::new(
        Arc::clone(&store),
        FlowDeps {
            transport: transport.clone(),
            agent: agent.clone(),
            extractor: extractor.clone(),
            renderer,
            quote: PriceQuote::default(),
            limits: UploadLimits::default(),
        },
    ));

    Harness {
        controller,
        store,
        transport,
        agent,
        extractor,
    }
}

fn harness(agent_fails: bool, extractor_fails: bool) -> Harness {
    harness_with(agent_fails, extractor_fails, Arc::new(PlainTextPolicyRenderer))
}

fn photo(file_id: &str) -> InboundMessage {
    InboundMessage::new(USER).with_photo(FileRef::new(file_id).with_mime_type("image/jpeg"))
}

impl Harness {
    async fn send(&self, message: InboundMessage) {
        self.controller.handle_inbound_message(message).await;
    }

    async fn say(&self, text: &str) {
        self.send(InboundMessage::text(USER, text)).await;
    }

    async fn session(&self) -> Session {
        self.store.get(USER).await.unwrap().snapshot().await
    }

    async fn step(&self) -> Step {
        self.session().await.step
    }

    fn texts(&self) -> Vec<String> {
        self.transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t.clone()),
                Sent::File { .. } => None,
            })
            .collect()
    }

    fn last_text(&self) -> String {
        self.texts().last().cloned().unwrap_or_default()
    }

    fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::File { name, bytes } => Some((name.clone(), bytes.clone())),
                Sent::Text(_) => None,
            })
            .collect()
    }

    /// With a failing agent and a working extractor, walk to `confirming_price`.
    async fn reach_price_without_agent(&self) {
        self.send(InboundMessage::command(USER, "/start")).await;
        self.send(photo("passport-1")).await;
        self.say("yes").await;
        self.send(photo("vehicle-1")).await;
        self.say("yes").await;
        assert_eq!(self.step().await, Step::ConfirmingPrice);
    }
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn full_application_with_working_agent() {
    let h = harness(false, false);

    h.send(InboundMessage::command(USER, "/start")).await;
    assert_eq!(h.step().await, Step::AwaitingFirstDocument);
    assert_eq!(h.last_text(), prompts::welcome_message());

    h.send(photo("passport-1")).await;
    assert_eq!(h.step().await, Step::ConfirmingFirstDocument);
    assert!(matches!(
        h.session().await.passport,
        Some(DocumentValue::Fields(ref f)) if f.get("surname") == Some("Doe")
    ));
    assert_eq!(h.last_text(), "Here is what I found. Is it correct?");

    h.agent.script("Perfect, thanks! [CONFIRMED]");
    h.say("yep that's me").await;
    assert_eq!(h.step().await, Step::AwaitingSecondDocument);
    assert_eq!(h.last_text(), "Perfect, thanks!");

    h.send(photo("vehicle-1")).await;
    assert_eq!(h.step().await, Step::ConfirmingSecondDocument);

    h.agent.script("Great. [CONFIRMED]");
    h.say("all correct").await;
    assert_eq!(h.step().await, Step::ConfirmingPrice);
    assert_eq!(h.last_text(), prompts::quote_message(&PriceQuote::default()));

    h.agent.script("Wonderful! [CONFIRMED]");
    h.say("sure, let's do it").await;
    assert_eq!(h.step().await, Step::Completed);
    assert_eq!(h.last_text(), prompts::closing_message());

    let files = h.files();
    assert_eq!(files.len(), 1);
    let policy = String::from_utf8(files[0].1.clone()).unwrap();
    assert!(policy.contains("Surname: Doe"));
    assert!(policy.contains("Make: Toyota"));
    assert!(policy.contains("100 USD"));

    // Only the agent's tool touched the extraction service.
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 2);
    assert!(h.texts().iter().all(|t| !t.contains('[')));
}

#[tokio::test]
async fn both_extraction_tiers_failing_falls_back_to_manual_entry() {
    let h = harness(true, true);
    h.send(InboundMessage::command(USER, "/start")).await;

    h.send(photo("passport-1")).await;
    let session = h.session().await;
    assert!(session.awaiting_manual_input);
    assert_eq!(session.step, Step::AwaitingFirstDocument);
    assert_eq!(h.last_text(), prompts::manual_entry_prompt(DocumentKind::Passport));

    h.say("Jane Doe, 1990-01-01, X1234567, Utopian").await;
    let session = h.session().await;
    assert!(!session.awaiting_manual_input);
    assert_eq!(session.step, Step::ConfirmingFirstDocument);
    assert_eq!(
        session.passport,
        Some(DocumentValue::Raw("Jane Doe, 1990-01-01, X1234567, Utopian".into()))
    );
    assert!(h.last_text().contains("Jane Doe, 1990-01-01"));
}

#[tokio::test]
async fn failing_agent_uses_extraction_service() {
    let h = harness(true, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(photo("passport-1")).await;

    let session = h.session().await;
    assert_eq!(session.step, Step::ConfirmingFirstDocument);
    assert!(!session.awaiting_manual_input);
    let Some(DocumentValue::Fields(fields)) = session.passport else {
        panic!("expected structured passport fields");
    };
    assert_eq!(fields.get("given_names"), Some("Jane"));
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
    assert!(h.last_text().contains("• Surname: Doe"));
    assert!(
        !h.texts()
            .contains(&prompts::manual_entry_prompt(DocumentKind::Passport))
    );
}

#[tokio::test]
async fn agent_reported_failure_does_not_fall_through() {
    let h = harness(false, true);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(photo("passport-1")).await;

    let session = h.session().await;
    assert_eq!(session.step, Step::AwaitingFirstDocument);
    assert!(!session.awaiting_manual_input);
    assert!(session.passport.is_none());
    // One call from the agent's tool, none from the direct tier.
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.last_text(), "Sorry, I couldn't read that photo.");
}

#[tokio::test]
async fn confirmation_marker_is_stripped_and_accepts() {
    let h = harness(false, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(photo("passport-1")).await;

    h.agent.script("Sounds good [CONFIRMED]");
    h.say("that's right").await;

    assert_eq!(h.last_text(), "Sounds good");
    assert_eq!(h.step().await, Step::AwaitingSecondDocument);
    let transcript = h.session().await.transcript;
    assert_eq!(transcript.last().unwrap().content, "Sounds good");
}

#[tokio::test]
async fn side_question_at_confirmation_keeps_step() {
    let h = harness(false, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(photo("passport-1")).await;

    h.agent
        .script("We only use it for the policy. Is the data correct? Reply yes or no.");
    h.say("why do you need my passport?").await;
    assert_eq!(h.step().await, Step::ConfirmingFirstDocument);
    assert!(h.session().await.passport.is_some());
}

#[tokio::test]
async fn yes_no_matching_when_agent_is_down() {
    let h = harness(true, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(photo("passport-1")).await;
    assert_eq!(h.step().await, Step::ConfirmingFirstDocument);

    h.say("maybe").await;
    assert_eq!(h.step().await, Step::ConfirmingFirstDocument);
    assert_eq!(h.last_text(), prompts::yes_no_reprompt());

    h.say("  YES ").await;
    assert_eq!(h.step().await, Step::AwaitingSecondDocument);
}

#[tokio::test]
async fn photo_at_price_step_gets_expected_action() {
    let h = harness(true, false);
    h.reach_price_without_agent().await;
    let before = h.session().await;

    h.send(photo("random-1")).await;
    let after = h.session().await;
    assert_eq!(after.step, Step::ConfirmingPrice);
    assert_eq!(after.transcript, before.transcript);
    assert!(
        h.last_text()
            .contains("Please reply \"yes\" to accept the price")
    );
}

#[tokio::test]
async fn rejecting_first_document_clears_and_retreats() {
    let h = harness(true, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(photo("passport-1")).await;

    h.say("no").await;
    let session = h.session().await;
    assert_eq!(session.step, Step::AwaitingFirstDocument);
    assert!(session.passport.is_none());

    h.send(photo("passport-2")).await;
    h.say("yes").await;
    h.send(photo("vehicle-1")).await;
    assert_eq!(h.step().await, Step::ConfirmingSecondDocument);
}

#[tokio::test]
async fn rejecting_price_stays_on_price_step() {
    let h = harness(true, false);
    h.reach_price_without_agent().await;

    h.say("no").await;
    assert_eq!(h.step().await, Step::ConfirmingPrice);
    assert!(h.last_text().contains("100 USD is the only price available"));

    h.say("yes").await;
    assert_eq!(h.step().await, Step::Completed);
    assert_eq!(h.files().len(), 1);
}

#[tokio::test]
async fn rejected_price_with_agent_stays() {
    let h = harness(false, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(photo("passport-1")).await;
    h.agent.script("Thanks [CONFIRMED]");
    h.say("ok").await;
    h.send(photo("vehicle-1")).await;
    h.agent.script("Thanks [CONFIRMED]");
    h.say("ok").await;
    assert_eq!(h.step().await, Step::ConfirmingPrice);

    h.agent
        .script("I understand, but the price is fixed at 100 USD. [REJECTED]");
    h.say("too expensive").await;
    assert_eq!(h.step().await, Step::ConfirmingPrice);
    assert_eq!(h.last_text(), "I understand, but the price is fixed at 100 USD.");
}

#[tokio::test]
async fn failed_delivery_is_retried_on_next_message() {
    let h = harness_with(true, false, Arc::new(FlakyRenderer::default()));
    h.reach_price_without_agent().await;

    h.say("yes").await;
    assert_eq!(h.step().await, Step::GeneratingDeliverable);
    assert_eq!(h.last_text(), prompts::delivery_deferred_message());
    assert!(h.files().is_empty());

    h.say("any news?").await;
    assert_eq!(h.step().await, Step::Completed);
    assert_eq!(h.files().len(), 1);
    assert_eq!(h.last_text(), prompts::closing_message());
}

#[tokio::test]
async fn completed_session_only_acknowledges() {
    let h = harness(true, false);
    h.reach_price_without_agent().await;
    h.say("yes").await;
    assert_eq!(h.step().await, Step::Completed);

    h.say("thanks!").await;
    assert_eq!(h.step().await, Step::Completed);
    assert_eq!(h.last_text(), prompts::closing_message());
    assert_eq!(h.files().len(), 1);
}

#[tokio::test]
async fn unsupported_message_gets_expected_action() {
    let h = harness(false, false);
    h.send(InboundMessage::new(USER)).await;
    assert_eq!(h.step().await, Step::Start);
    assert!(h.last_text().starts_with("Send /start"));
    assert_eq!(h.agent.prompt_count(), 0);
}

#[tokio::test]
async fn off_script_text_goes_to_agent() {
    let h = harness(false, false);
    h.send(InboundMessage::command(USER, "/start")).await;

    h.agent.script("You can send it as a photo. [CONFIRMED]");
    h.say("how do I send my passport?").await;

    assert_eq!(h.step().await, Step::AwaitingFirstDocument);
    assert_eq!(h.last_text(), "You can send it as a photo.");
    let transcript = h.session().await.transcript;
    assert!(transcript.iter().any(|e| e.content == "how do I send my passport?"));
}

#[tokio::test]
async fn off_script_text_without_agent_gets_fallback() {
    let h = harness(true, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.say("hello?").await;

    assert_eq!(h.step().await, Step::AwaitingFirstDocument);
    assert_eq!(
        h.last_text(),
        prompts::fallback_message("Please send a photo of your passport.")
    );
}

#[tokio::test]
async fn invalid_uploads_change_nothing() {
    let h = harness(false, false);
    h.send(InboundMessage::command(USER, "/start")).await;

    let huge = InboundMessage::new(USER).with_photo(FileRef::new("big").with_size(64 * 1024 * 1024));
    h.send(huge).await;
    assert!(h.last_text().contains("too large"));

    let zip = InboundMessage::new(USER)
        .with_document(FileRef::new("z").with_mime_type("application/zip"));
    h.send(zip).await;
    assert!(h.last_text().contains("not supported"));

    h.send(photo("expired-1")).await;
    assert!(h.last_text().contains("couldn't download"));

    assert_eq!(h.step().await, Step::AwaitingFirstDocument);
    assert_eq!(h.agent.prompt_count(), 0);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pdf_document_is_ingested() {
    let h = harness(true, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(
        InboundMessage::new(USER)
            .with_document(FileRef::new("scan").with_file_name("passport.pdf")),
    )
    .await;
    assert_eq!(h.step().await, Step::ConfirmingFirstDocument);
}

#[tokio::test]
async fn users_progress_independently() {
    let h = Arc::new(harness(true, false));

    let mut tasks = Vec::new();
    for user in ["a", "b", "c"] {
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move {
            h.send(InboundMessage::command(user, "/start")).await;
            h.send(InboundMessage::new(user).with_photo(FileRef::new(format!("{user}-p"))))
                .await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(h.store.len().await, 3);
    for user in ["a", "b", "c"] {
        let handle = h.store.get(user).await.unwrap();
        assert_eq!(handle.step().await, Step::ConfirmingFirstDocument);
    }
}

#[tokio::test]
async fn agent_reply_without_stored_data_uses_extraction_service() {
    let h = harness(false, false);
    h.agent.skip_tool.store(true, Ordering::SeqCst);
    h.send(InboundMessage::command(USER, "/start")).await;

    h.agent.script("Looks like a passport to me!");
    h.send(photo("passport-1")).await;

    assert_eq!(h.agent.prompt_count(), 1);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.step().await, Step::ConfirmingFirstDocument);
    assert!(h.last_text().contains("• Surname: Doe"));
    assert!(!h.texts().iter().any(|t| t.contains("Looks like a passport")));
}

#[tokio::test]
async fn failed_send_in_handler_gets_retry_prompt() {
    let h = harness(false, false);
    h.send(InboundMessage::command(USER, "/start")).await;

    *h.transport.fail_on.lock().unwrap() = Some("Got it! Reading your".to_string());
    h.send(photo("passport-1")).await;

    assert_eq!(
        h.last_text(),
        prompts::retry_prompt(&[ContentType::Photo, ContentType::Document])
    );
    assert_eq!(h.step().await, Step::AwaitingFirstDocument);
    assert_eq!(h.agent.prompt_count(), 0);
}

#[tokio::test]
async fn bare_marker_reply_still_transitions() {
    let h = harness(false, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(photo("passport-1")).await;

    h.agent.script("[CONFIRMED]");
    h.say("yes").await;

    assert_eq!(h.step().await, Step::AwaitingSecondDocument);
    assert_eq!(
        h.last_text(),
        prompts::accepted_message(ConfirmationSubject::Document(DocumentKind::Passport))
    );
    let transcript = h.session().await.transcript;
    assert!(!transcript.last().unwrap().content.trim().is_empty());
}

#[tokio::test]
async fn bare_rejection_marker_at_price_restates_price() {
    let h = harness(false, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(photo("passport-1")).await;
    h.agent.script("Thanks [CONFIRMED]");
    h.say("ok").await;
    h.send(photo("vehicle-1")).await;
    h.agent.script("Thanks [CONFIRMED]");
    h.say("ok").await;

    h.agent.script("  [REJECTED] ");
    h.say("nope").await;
    assert_eq!(h.step().await, Step::ConfirmingPrice);
    assert!(h.last_text().contains("100 USD is the only price available"));
}

#[tokio::test]
async fn stray_tool_call_cannot_overwrite_confirmed_passport() {
    let h = harness(false, false);
    h.send(InboundMessage::command(USER, "/start")).await;
    h.send(photo("passport-1")).await;
    h.agent.script("Thanks [CONFIRMED]");
    h.say("ok").await;
    assert_eq!(h.step().await, Step::AwaitingSecondDocument);
    let confirmed = h.session().await.passport;

    let stray = ExtractArgs {
        user_id: USER.to_string(),
        file_url: "https://files.test/other".to_string(),
        document_kind: "passport".to_string(),
    };
    assert!(h.agent.tool.extract_into_session(stray).await.is_err());
    assert_eq!(h.session().await.passport, confirmed);
    assert_eq!(h.step().await, Step::AwaitingSecondDocument);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queued_messages_run_in_arrival_order() {
    let h = harness(true, false);
    let dispatcher = MessageDispatcher::new(Arc::clone(&h.controller));

    for user in ["a", "b"] {
        let burst = [
            InboundMessage::command(user, "/start"),
            InboundMessage::new(user).with_photo(FileRef::new(format!("{user}-passport"))),
            InboundMessage::text(user, "yes"),
            InboundMessage::new(user).with_photo(FileRef::new(format!("{user}-vehicle"))),
            InboundMessage::text(user, "yes"),
        ];
        for message in burst {
            dispatcher.dispatch(message).await;
        }
    }
    assert_eq!(dispatcher.active_users().await, 2);
    dispatcher.drain().await;

    assert_eq!(dispatcher.active_users().await, 0);
    for user in ["a", "b"] {
        let handle = h.store.get(user).await.unwrap();
        assert_eq!(handle.step().await, Step::ConfirmingPrice);
    }
}
