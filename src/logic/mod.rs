/// Logic Layer - record reconciliation and polling policy
///
/// Everything here is synchronous decision logic, except the merger's
/// store round-trips:
/// - domain types shared across layers
/// - lap-time and upload-date codecs
/// - best-time-wins merge of scraped rows into stored records
/// - tiered interval classification

pub mod types;
pub mod lap_time;
pub mod merger;
pub mod interval_policy;

pub use types::{LapRecord, MergeOutcome, PairKey, PairSchedule, PairState, ScrapedRow, TrackedPair};
pub use lap_time::{format_lap_time, parse_lap_time, parse_upload_date};
pub use merger::{RecordDiff, ResultMerger, plan_merge, reconcile};
pub use interval_policy::{IntervalPolicy, Tier};
