use crate::screening::orchestrator::Screener;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Screening pipeline. Holds the extractor and the shared completion client.
    pub screener: Screener,
}
