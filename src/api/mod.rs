//! HTTP surface for the answering pipeline.
//!
//! A thin axum layer: one answering endpoint, health, and two admin
//! routes (policy reload, telemetry snapshot). All domain decisions live
//! in the pipeline; handlers translate outcomes to status codes and JSON.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod types;
