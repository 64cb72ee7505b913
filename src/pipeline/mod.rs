// Pipelines — the run orchestration and the enrichment batch it drives.

pub mod enrich;
pub mod prioritize;
pub mod run;

pub use enrich::{enrich_clusters, EnrichOptions, EnrichSummary};
pub use run::{analyze, execute, Analysis, RunContext, RunInputs, RunReport, RunSettings, RunStatus};
