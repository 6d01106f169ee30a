/// Data Synchronization Layer
///
/// Everything that talks to the leaderboard source or drives polling:
///
/// - page transport (HTTP) and the page parser contract
/// - bounded concurrent page fetching per tracked pair
/// - the scheduler: due-pair selection, fetch + merge fan-out, rescheduling
/// - a timer-driven service delivering cycle reports over a channel

// Core data sync components
pub mod config;
pub mod transport;
pub mod page;
pub mod fetcher;
pub mod scheduler;
pub mod service;


// Re-export main components for easy usage
pub use config::SyncConfig;
pub use transport::{HttpTransport, PageTransport};
pub use page::{JsonPageParser, PageParser, ParsedPage, RawRow, RowRejection};
pub use fetcher::{FetchedRows, PageFetcher};
pub use scheduler::{CycleReport, PairFailure, PairOutcome, Scheduler, SweepReport};
pub use service::{UpdateService, UpdateServiceBuilder};
