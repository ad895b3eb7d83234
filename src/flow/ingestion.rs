//! Document ingestion: upload validation and the three extraction tiers.
//!
//! Tier 1 asks the agent to run its extraction tool. Tier 2 calls the
//! extraction service directly and only runs when tier 1 errors. Tier 3 asks
//! the user to type the data and only runs when tier 2 errors. An
//! agent-reported extraction failure is a completed tier 1 and never falls
//! through.

use crate::channels::FileRef;
use crate::config::UploadLimits;
use crate::error::FlowError;
use crate::llm::AgentSignal;
use crate::session::{DocumentKind, DocumentValue, SessionHandle, TranscriptEntry};

use super::content::ContentType;
use super::controller::FlowDeps;
use super::prompts;

/// Why an upload was refused before any extraction ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    UnsupportedFormat(String),
    TooLarge { size: u64, limit: u64 },
    Unavailable,
}

impl UploadRejection {
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedFormat(format) => format!(
                "Sorry, {format} files are not supported. \
                 Please send a photo, or a JPEG, PNG or PDF file."
            ),
            Self::TooLarge { size, limit } => format!(
                "That file is too large ({:.1} MB). The limit is {:.0} MB, please send a smaller one.",
                *size as f64 / (1024.0 * 1024.0),
                *limit as f64 / (1024.0 * 1024.0),
            ),
            Self::Unavailable => {
                "Sorry, I couldn't download that file. Please send it again.".to_string()
            }
        }
    }
}

/// Check a submitted file against the upload limits.
///
/// Photos are always JPEG. Files are checked by MIME type, falling back to
/// the file extension when the transport did not report one.
pub fn validate_upload(
    file: &FileRef,
    content: ContentType,
    limits: &UploadLimits,
) -> Result<(), UploadRejection> {
    if content != ContentType::Photo {
        let mime = file
            .mime_type
            .clone()
            .or_else(|| file.file_name.as_deref().and_then(mime_from_extension));
        match mime {
            Some(mime) if limits.allowed_mime_types.iter().any(|m| *m == mime) => {}
            Some(mime) => return Err(UploadRejection::UnsupportedFormat(mime)),
            None => return Err(UploadRejection::UnsupportedFormat("unknown".to_string())),
        }
    }

    if let Some(size) = file.file_size
        && size > limits.max_bytes
    {
        return Err(UploadRejection::TooLarge {
            size,
            limit: limits.max_bytes,
        });
    }
    Ok(())
}

fn mime_from_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let mime = match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime.to_string())
}

/// How an ingestion attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Upload refused; nothing changed.
    Rejected,
    /// Tier 1 succeeded; the tool stored the fields.
    AgentExtracted,
    /// Tier 1 ran and the agent reported an unreadable document.
    AgentReportedFailure,
    /// Tier 2 succeeded.
    DirectExtracted,
    /// Tier 2 failed; waiting for typed data.
    ManualRequested,
    /// Typed data stored.
    ManualAccepted,
}

/// Runs the extraction tiers for one document step.
pub struct DocumentPipeline<'a> {
    deps: &'a FlowDeps,
}

impl<'a> DocumentPipeline<'a> {
    pub fn new(deps: &'a FlowDeps) -> Self {
        Self { deps }
    }

    /// Ingest a submitted photo or file.
    pub async fn ingest_file(
        &self,
        handle: &SessionHandle,
        kind: DocumentKind,
        file: &FileRef,
        content: ContentType,
    ) -> Result<IngestOutcome, FlowError> {
        let user_id = handle.user_id();

        if let Err(rejection) = validate_upload(file, content, &self.deps.limits) {
            tracing::info!(user_id = %user_id, ?rejection, "Upload rejected");
            self.deps.say(user_id, &rejection.user_message()).await?;
            return Ok(IngestOutcome::Rejected);
        }

        let file_url = match self.deps.transport.resolve_file_url(file).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(user_id = %user_id, file_id = %file.file_id, "File resolution failed: {}", e);
                self.deps
                    .say(user_id, &UploadRejection::Unavailable.user_message())
                    .await?;
                return Ok(IngestOutcome::Rejected);
            }
        };

        // A new submission replaces whatever was stored for this document.
        handle
            .update(|s| {
                s.clear_document(kind);
                s.awaiting_manual_input = false;
            })
            .await;

        self.deps.say(user_id, &prompts::processing_ack(kind)).await?;

        if let Some(outcome) = self.agent_tier(handle, kind, &file_url).await? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.direct_tier(handle, kind, &file_url).await? {
            return Ok(outcome);
        }
        self.request_manual(handle, kind).await
    }

    /// Store typed data as the raw document value.
    pub async fn complete_manual(
        &self,
        handle: &SessionHandle,
        kind: DocumentKind,
        text: &str,
    ) -> Result<IngestOutcome, FlowError> {
        let text = text.trim();
        let confirmation = prompts::manual_confirmation(kind, text);
        let step = handle
            .update(|s| {
                s.set_document(kind, DocumentValue::Raw(text.to_string()));
                s.awaiting_manual_input = false;
                s.push_transcript(TranscriptEntry::user(text));
                s.push_transcript(TranscriptEntry::assistant(&confirmation));
                s.advance()
            })
            .await;
        tracing::info!(user_id = %handle.user_id(), step = %step, kind = %kind, "Manual document data stored");

        self.deps.say(handle.user_id(), &confirmation).await?;
        Ok(IngestOutcome::ManualAccepted)
    }

    /// Tier 1. `None` means fall through to tier 2.
    async fn agent_tier(
        &self,
        handle: &SessionHandle,
        kind: DocumentKind,
        file_url: &str,
    ) -> Result<Option<IngestOutcome>, FlowError> {
        let user_id = handle.user_id();
        let transcript = handle.snapshot().await.transcript;
        let prompt = prompts::extraction_instruction(user_id, file_url, kind);

        self.deps.typing(user_id).await;
        let reply = match self.deps.agent.run(&transcript, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(user_id = %user_id, kind = %kind, "Agent extraction failed, calling extraction service: {}", e);
                return Ok(None);
            }
        };

        if reply.signal == Some(AgentSignal::ExtractionFailed) {
            let reply = reply.or_fallback(|| prompts::unreadable_document(kind));
            handle.update(|s| s.replace_transcript(reply.transcript)).await;
            tracing::info!(user_id = %user_id, kind = %kind, "Agent reported unreadable document");
            self.deps.say(user_id, &reply.text).await?;
            return Ok(Some(IngestOutcome::AgentReportedFailure));
        }

        // The reply only counts if the tool actually stored the data.
        let stored = handle
            .update(|s| match s.document(kind) {
                Some(DocumentValue::Fields(fields)) => Some(fields.clone()),
                _ => None,
            })
            .await;
        let Some(fields) = stored else {
            tracing::warn!(user_id = %user_id, kind = %kind, "Agent replied without storing document data, calling extraction service");
            tracing::debug!(user_id = %user_id, reply = %reply.text, "Discarded agent reply");
            return Ok(None);
        };

        let reply = reply.or_fallback(|| prompts::fields_summary(kind, &fields));
        let step = handle
            .update(|s| {
                s.replace_transcript(reply.transcript);
                s.advance()
            })
            .await;
        tracing::info!(user_id = %user_id, step = %step, kind = %kind, "Document extracted by agent");
        self.deps.say(user_id, &reply.text).await?;
        Ok(Some(IngestOutcome::AgentExtracted))
    }

    /// Tier 2. `None` means fall through to tier 3.
    async fn direct_tier(
        &self,
        handle: &SessionHandle,
        kind: DocumentKind,
        file_url: &str,
    ) -> Result<Option<IngestOutcome>, FlowError> {
        let user_id = handle.user_id();

        self.deps.typing(user_id).await;
        let fields = match self.deps.extractor.extract(file_url, kind).await {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!(user_id = %user_id, kind = %kind, "Extraction service failed, asking for manual entry: {}", e);
                return Ok(None);
            }
        };

        let summary = prompts::fields_summary(kind, &fields);
        let step = handle
            .update(|s| {
                s.set_document(kind, DocumentValue::Fields(fields));
                s.push_transcript(TranscriptEntry::assistant(&summary));
                s.advance()
            })
            .await;
        tracing::info!(user_id = %user_id, step = %step, kind = %kind, "Document extracted by service");

        self.deps.say(user_id, &summary).await?;
        Ok(Some(IngestOutcome::DirectExtracted))
    }

    /// Tier 3 entry.
    async fn request_manual(
        &self,
        handle: &SessionHandle,
        kind: DocumentKind,
    ) -> Result<IngestOutcome, FlowError> {
        let prompt = prompts::manual_entry_prompt(kind);
        handle
            .update(|s| {
                s.awaiting_manual_input = true;
                s.push_transcript(TranscriptEntry::assistant(&prompt));
            })
            .await;
        tracing::info!(user_id = %handle.user_id(), kind = %kind, "Waiting for manual document entry");
        self.deps.say(handle.user_id(), &prompt).await?;
        Ok(IngestOutcome::ManualRequested)
    }
}
