//! Retrieval-augmented answering: retrieve → format → prompt → generate.

pub mod pipeline;
pub mod prompt;

pub use pipeline::{AnswerPipeline, AnswerStream};
pub use prompt::REFUSAL;
