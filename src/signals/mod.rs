// Demand signals — monthly engagement, search-console traffic and
// AI-overview presence, fused into one comparable trend per cluster.

pub mod fuser;
pub mod monthly;
pub mod search;

pub use fuser::{fuse, percent_change, FusionConfig, TrendRow, TrendSignal};
pub use monthly::{aggregate_engagement, EngagementPoint, Month};
pub use search::{AioSnapshot, QueryTotals, SearchIndex, SearchRow};
