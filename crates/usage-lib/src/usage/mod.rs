//! Usage aggregation, efficiency, ranking and rollups

mod aggregate;
mod efficiency;
mod ranking;
mod rollup;

pub use aggregate::{aggregate_usage, seconds_to_hours};
pub use efficiency::{EfficiencyEngine, EfficiencyTable, JobEfficiency, UsagePair};
pub use ranking::{rank_usage, rank_values};
pub use rollup::{rollup_sponsors, rollup_users};
