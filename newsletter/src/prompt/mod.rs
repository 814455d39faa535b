pub mod classifier;
pub mod cost;
pub mod gateway;
pub(crate) mod gemini;
pub mod link_qa;
pub(crate) mod openai;
pub mod summarizer;
pub mod synthesis;

pub use cost::{CostLedger, UsageRecord};
pub use gateway::{Completer, Completion, CompletionGateway, GenerationParams};

/// Result of an LLM stage that falls back to a known-good value on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome<T> {
    Generated(T),
    Fallback(T),
}

impl<T> StageOutcome<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, StageOutcome::Fallback(_))
    }

    pub fn value(&self) -> &T {
        match self {
            StageOutcome::Generated(v) | StageOutcome::Fallback(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            StageOutcome::Generated(v) | StageOutcome::Fallback(v) => v,
        }
    }
}
