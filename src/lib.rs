//! UsageLens - GUI telemetry analytics.
//!
//! Stores recorded GUI events, reconstructs user sessions from them and
//! attributes the time between events to activity labels.

pub mod analytics;
pub mod database;
pub mod error;
pub mod query_config;
pub mod server;
pub mod service;
pub mod settings;
pub mod source;
