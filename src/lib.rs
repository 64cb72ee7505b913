// TopicScout: topic clustering and market-state scoring for community posts
//
// This is the library root. Each module corresponds to a stage of a run,
// from the document store through clustering, signal fusion and
// classification to the cached enrichment step.

pub mod clustering;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod scoring;
pub mod signals;
pub mod status;
pub mod store;
pub mod topics;

pub use error::EngineError;
