// Three-Layer Architecture
pub mod data_sync;   // Data Layer: page fetching, scheduling, timer service
pub mod logic;      // Logic Layer: record reconciliation, interval tiers
pub mod store;      // Persistence seam and in-memory backend

pub mod events;
pub mod error;

// Common utilities and types
pub mod utils;

// Re-export key components from each layer
pub use data_sync::{
    CycleReport, HttpTransport, JsonPageParser, PageFetcher, PageParser, PageTransport, PairFailure, PairOutcome,
    Scheduler, SweepReport, SyncConfig, UpdateService, UpdateServiceBuilder,
};
pub use logic::{
    IntervalPolicy, LapRecord, MergeOutcome, PairKey, PairSchedule, PairState, ResultMerger, ScrapedRow, Tier,
    TrackedPair, format_lap_time, parse_lap_time,
};
pub use store::{MemoryStore, Store, StoreError};
pub use events::{ChannelSink, DomainEvent, EventBus, EventKind, EventSink, LogSink};
pub use error::{ErrorKind, SyncError, SyncResult};
