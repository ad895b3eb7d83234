//! Document-data extraction service.
//!
//! The service turns a downloadable file URL into structured fields for one
//! of the known [`DocumentKind`]s. It is an unreliable upstream: every call
//! may fail, and callers fall back to other tiers when it does.

pub mod http;

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::session::{DocumentFields, DocumentKind};

pub use http::HttpExtractor;

/// Extracts structured fields from an uploaded document.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(
        &self,
        file_url: &str,
        kind: DocumentKind,
    ) -> Result<DocumentFields, ExtractionError>;
}

/// Keep only fields the kind knows about, in canonical order.
///
/// Returns an error when nothing recognizable is left.
pub fn normalize_fields<'a>(
    kind: DocumentKind,
    raw: impl IntoIterator<Item = (&'a str, String)>,
) -> Result<DocumentFields, ExtractionError> {
    let raw: Vec<(&str, String)> = raw
        .into_iter()
        .map(|(name, value)| (name, value.trim().to_string()))
        .filter(|(_, value)| !value.is_empty())
        .collect();

    let fields: DocumentFields = kind
        .expected_fields()
        .iter()
        .filter_map(|expected| {
            raw.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(expected))
                .map(|(_, value)| (*expected, value.clone()))
        })
        .collect();

    if fields.is_empty() {
        return Err(ExtractionError::UnrecognizedFields {
            kind: kind.to_string(),
        });
    }
    Ok(fields)
}
