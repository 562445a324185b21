pub mod api;
pub mod audit;
pub mod config;
pub mod consultation;
pub mod encounter;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod policy;
pub mod rate_limit;
pub mod safety;
pub mod telemetry;

pub use model::schema::{AnswerKind, StructuredAnswer};
pub use pipeline::{AnswerPipeline, PipelineOutcome};
