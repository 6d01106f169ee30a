pub mod constants;
pub mod config_loader;
pub mod telemetry;

pub use constants::*;
pub use config_loader::*;
pub use telemetry::{init_telemetry, init_telemetry_json};
