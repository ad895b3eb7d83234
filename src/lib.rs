//! Intake Bot — conversational car insurance application over chat.

pub mod channels;
pub mod config;
pub mod error;
pub mod extraction;
pub mod flow;
pub mod llm;
pub mod session;
