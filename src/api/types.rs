//! Shared state for the API layer.

use std::sync::Arc;

use crate::pipeline::AnswerPipeline;
use crate::policy::PolicyStore;
use crate::telemetry::Telemetry;

/// Process-wide services handed to every handler.
#[derive(Clone)]
pub struct ApiContext {
    pub pipeline: Arc<AnswerPipeline>,
    pub policies: Arc<PolicyStore>,
    pub telemetry: Arc<Telemetry>,
}

impl ApiContext {
    pub fn new(
        pipeline: Arc<AnswerPipeline>,
        policies: Arc<PolicyStore>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            pipeline,
            policies,
            telemetry,
        }
    }
}
