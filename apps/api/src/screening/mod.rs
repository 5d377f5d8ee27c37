// Resume screening pipeline.
// Extract text → build prompt → ask the model → parse score → rank.
// All LLM calls go through llm_client; no direct HTTP calls here.

pub mod cancel;
pub mod extractor;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod progress;
pub mod prompts;
