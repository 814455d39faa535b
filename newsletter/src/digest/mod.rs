pub mod corrections;
pub mod grouping;
pub mod normalize;
pub mod pipeline;

pub use pipeline::{DigestPipeline, PipelineSettings};
