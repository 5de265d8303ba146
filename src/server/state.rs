//! Shared application state for the HTTP server.

use crate::service::AnalyticsService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: AnalyticsService,
}

impl AppState {
    pub fn new(service: AnalyticsService) -> Self {
        Self { service }
    }
}
