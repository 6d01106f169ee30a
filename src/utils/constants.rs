/// Default leaderboard location; override with `DATASOURCE_URL`.
pub const DEFAULT_DATASOURCE_URL: &str =
    "http://127.0.0.1:8080/leaderboard?track={track_id}&vehicle={vehicle_id}&page={page}";

/// Marker the source uses for players it cannot resolve.
pub const UNKNOWN_PLAYER_NAME: &str = "<unknown>";

/// Upper bound on a pager's reported page count; anything above is a corrupt page.
pub const MAX_DISCOVERED_PAGES: u32 = 10_000;

pub const SECTOR_COUNT: usize = 3;

pub const LOW_UPDATE_THRESHOLD: usize = 5;

// Interval hours per tier; higher urgency polls more often.
pub const LOW_UPDATE_INTERVAL_HOURS: u32 = 168;
pub const MID_UPDATE_INTERVAL_HOURS: u32 = 48;
pub const HIGH_UPDATE_INTERVAL_HOURS: u32 = 6;
