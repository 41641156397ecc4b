//! Upstream generation integration: typed payloads, the REST client, and
//! the job handler that drives one generation end to end.

pub mod client;
pub mod processor;
pub mod types;

pub use client::GenerationClient;
pub use processor::GenerationProcessor;
pub use types::{GenerationPayload, GenerationRequest, ReferenceMode};
