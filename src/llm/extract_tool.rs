//! `extract_document` tool — lets the agent run the extraction service and
//! store the result in the caller's session.
//!
//! The agent only knows the user through the id carried in its prompt, so
//! the tool takes it as an argument and looks the session up itself.

use std::sync::Arc;

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use serde::Deserialize;

use crate::error::ExtractionError;
use crate::extraction::DocumentExtractor;
use crate::session::{DocumentKind, DocumentValue, SessionStore, Step};

/// Arguments the model passes to the tool.
#[derive(Debug, Deserialize)]
pub struct ExtractArgs {
    pub user_id: String,
    pub file_url: String,
    pub document_kind: String,
}

/// Tool that extracts document fields and writes them into a session.
pub struct ExtractDocumentTool {
    store: Arc<SessionStore>,
    extractor: Arc<dyn DocumentExtractor>,
}

impl ExtractDocumentTool {
    pub fn new(store: Arc<SessionStore>, extractor: Arc<dyn DocumentExtractor>) -> Self {
        Self { store, extractor }
    }

    /// Run the extraction and store the fields. Shared by the rig tool impl
    /// and tests.
    pub async fn extract_into_session(
        &self,
        args: ExtractArgs,
    ) -> Result<serde_json::Value, ExtractionError> {
        let kind: DocumentKind = args.document_kind.parse()?;
        let Some(handle) = self.store.get(&args.user_id).await else {
            return Err(ExtractionError::RequestFailed(format!(
                "no session for user {}",
                args.user_id
            )));
        };

        let awaiting = handle.step().await;
        if awaiting != kind.upload_step() {
            return Err(not_awaiting(kind, awaiting));
        }

        let fields = self.extractor.extract(&args.file_url, kind).await?;
        let summary: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|(name, value)| (name.to_string(), serde_json::Value::from(value)))
            .collect();

        // The step may have moved while the extraction service was running.
        handle
            .update(|session| {
                if session.step != kind.upload_step() {
                    return Err(not_awaiting(kind, session.step));
                }
                session.set_document(kind, DocumentValue::Fields(fields));
                Ok(())
            })
            .await?;

        tracing::info!(user_id = %args.user_id, kind = %kind, "Agent tool stored document fields");
        Ok(serde_json::Value::Object(summary))
    }
}

fn not_awaiting(kind: DocumentKind, step: Step) -> ExtractionError {
    ExtractionError::NotAwaiting {
        kind: kind.to_string(),
        step: step.to_string(),
    }
}

impl Tool for ExtractDocumentTool {
    const NAME: &'static str = "extract_document";

    type Error = ExtractionError;
    type Args = ExtractArgs;
    type Output = serde_json::Value;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Extract the fields of an uploaded passport or vehicle registration \
                          document and save them to the user's application. Returns the \
                          extracted fields."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "user_id": {
                        "type": "string",
                        "description": "The user id given in the instruction"
                    },
                    "file_url": {
                        "type": "string",
                        "description": "Downloadable URL of the uploaded file"
                    },
                    "document_kind": {
                        "type": "string",
                        "enum": ["passport", "vehicle_registration"],
                        "description": "Which document the file contains"
                    }
                },
                "required": ["user_id", "file_url", "document_kind"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        self.extract_into_session(args).await
    }
}
