//! Per-user session state — the step machine, transcript, and collected
//! documents. Sessions live in memory for the lifetime of the process.

pub mod model;
pub mod step;
pub mod store;

pub use model::{DocumentFields, DocumentKind, DocumentValue, Role, Session, TranscriptEntry};
pub use step::Step;
pub use store::{SessionHandle, SessionStore};
