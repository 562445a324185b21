//! Generative model invocation under guardrails.
//!
//! Everything between "the question is safe to answer" and "a validated
//! [`schema::StructuredAnswer`] exists": prompt construction, the
//! provider client, bounded retry/backoff, the primary→fallback state
//! machine, schema enforcement, the response-side deny gate, and the
//! defensive emergency override.

mod client;
mod invoker;
mod prompt;
mod retry;
pub mod schema;

pub use client::{ChatModel, MockChatModel, OpenAiCompatClient};
pub use invoker::{AnswerContext, InvokerConfig, ModelInvoker};
pub use prompt::{build_grounded_context, build_system_prompt, build_user_message};
pub use retry::{BackoffPolicy, RetryOutcome};

/// Errors from a single model attempt. All variants are retryable from the
/// invoker's perspective; distinguishing them matters for logs and for the
/// schema-invalid counter.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model call timed out after {0}ms")]
    Timeout(u64),
    #[error("Failed to reach model provider: {0}")]
    Connection(String),
    #[error("Model provider returned HTTP {status}")]
    Provider { status: u16, body: String },
    #[error("Model returned an empty completion")]
    EmptyCompletion,
    #[error("Model response contained no JSON object")]
    MissingJson,
    #[error("Model response JSON was invalid: {0}")]
    InvalidJson(String),
    #[error("Model response violated the answer schema: {0}")]
    Schema(String),
}

impl ModelError {
    /// Schema-level failures, as opposed to transport-level: the model
    /// answered, but not in the shape the contract demands.
    pub fn is_schema_failure(&self) -> bool {
        matches!(
            self,
            ModelError::EmptyCompletion
                | ModelError::MissingJson
                | ModelError::InvalidJson(_)
                | ModelError::Schema(_)
        )
    }
}
