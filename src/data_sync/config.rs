use crate::utils::config_loader::{LoadConfigError, load_from_file, load_from_file_sync};
use crate::utils::constants::*;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Configuration for polling, fetching and interval classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Leaderboard URL template with `{track_id}`, `{vehicle_id}` and `{page}` placeholders
    pub datasource_url: String,
    /// Timeout for a single page request in seconds
    pub request_timeout_secs: u64,
    /// Timeout for fetching all pages of one pair in seconds
    pub pair_timeout_secs: u64,
    /// Maximum number of pairs processed concurrently within a cycle
    pub max_concurrent_pairs: usize,
    /// Maximum number of in-flight page requests per pair
    pub max_concurrent_pages: usize,
    /// Page cap per pair; 0 fetches every discovered page
    pub max_pages_per_pair: u32,
    /// Pairs with more records than this poll at the MID tier
    pub low_update_threshold: usize,
    pub low_update_interval_hours: u32,
    pub mid_update_interval_hours: u32,
    pub high_update_interval_hours: u32,
    /// Due pairs processed per cycle; 0 means unbounded
    pub cycle_limit: usize,
    /// Period of the timer driver in seconds
    pub cycle_interval_secs: u64,
    /// Buffer size for the cycle report channel
    pub channel_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            datasource_url: DEFAULT_DATASOURCE_URL.to_string(),
            request_timeout_secs: 15,
            pair_timeout_secs: 120,
            max_concurrent_pairs: 5,
            max_concurrent_pages: 4,
            max_pages_per_pair: 0,
            low_update_threshold: LOW_UPDATE_THRESHOLD,
            low_update_interval_hours: LOW_UPDATE_INTERVAL_HOURS,
            mid_update_interval_hours: MID_UPDATE_INTERVAL_HOURS,
            high_update_interval_hours: HIGH_UPDATE_INTERVAL_HOURS,
            cycle_limit: 0,
            cycle_interval_secs: 600,
            channel_buffer_size: 16,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SyncConfigFile {
    #[serde(default)]
    sync: SyncConfig,
}

pub fn render_page_url(template: &str, track_id: u32, vehicle_id: u32, page: u32) -> String {
    template
        .replace("{track_id}", &track_id.to_string())
        .replace("{vehicle_id}", &vehicle_id.to_string())
        .replace("{page}", &page.to_string())
}

fn env_override<T>(name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        *target = raw.trim().parse().map_err(|e| eyre!("Invalid {}: {}", name, e))?;
    }
    Ok(())
}

impl SyncConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(datasource_url) = std::env::var("DATASOURCE_URL") {
            config.datasource_url = datasource_url;
        }
        env_override("REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;
        env_override("PAIR_TIMEOUT_SECS", &mut config.pair_timeout_secs)?;
        env_override("MAX_CONCURRENT_PAIRS", &mut config.max_concurrent_pairs)?;
        env_override("MAX_CONCURRENT_PAGES", &mut config.max_concurrent_pages)?;
        env_override("MAX_PAGES_PER_PAIR", &mut config.max_pages_per_pair)?;
        env_override("LOW_UPDATE_THRESHOLD", &mut config.low_update_threshold)?;
        env_override("LOW_UPDATE_INTERVAL", &mut config.low_update_interval_hours)?;
        env_override("MID_UPDATE_INTERVAL", &mut config.mid_update_interval_hours)?;
        env_override("HIGH_UPDATE_INTERVAL", &mut config.high_update_interval_hours)?;
        env_override("CYCLE_LIMIT", &mut config.cycle_limit)?;
        env_override("CYCLE_INTERVAL_SECS", &mut config.cycle_interval_secs)?;
        env_override("CHANNEL_BUFFER_SIZE", &mut config.channel_buffer_size)?;

        config.validate()?;
        Ok(config)
    }

    /// Load the `[sync]` section of a TOML file. `${VAR}` references are expanded.
    pub fn load(file_name: &str) -> Result<Self> {
        let file: SyncConfigFile = load_from_file_sync(file_name.to_string())?;
        file.sync.validate()?;
        Ok(file.sync)
    }

    pub async fn load_async(file_name: &str) -> Result<Self> {
        let file: SyncConfigFile = load_from_file(file_name.to_string()).await?;
        file.sync.validate()?;
        Ok(file.sync)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: SyncConfigFile = toml::from_str(contents).map_err(LoadConfigError::from)?;
        file.sync.validate()?;
        Ok(file.sync)
    }

    pub fn validate(&self) -> Result<()> {
        let probe = self.page_url(1, 1, 1);
        Url::parse(&probe).map_err(|e| eyre!("Invalid DATASOURCE_URL '{}': {}", self.datasource_url, e))?;

        if self.max_concurrent_pairs == 0 || self.max_concurrent_pages == 0 {
            return Err(eyre!("Concurrency limits must be at least 1"));
        }
        if self.request_timeout_secs == 0 || self.pair_timeout_secs == 0 {
            return Err(eyre!("Timeouts must be at least 1 second"));
        }
        if self.high_update_interval_hours == 0 {
            return Err(eyre!("Update intervals must be at least 1 hour"));
        }
        if !(self.high_update_interval_hours < self.mid_update_interval_hours
            && self.mid_update_interval_hours < self.low_update_interval_hours)
        {
            return Err(eyre!(
                "Update intervals must satisfy high < mid < low, got {} / {} / {}",
                self.high_update_interval_hours,
                self.mid_update_interval_hours,
                self.low_update_interval_hours
            ));
        }
        Ok(())
    }

    pub fn page_url(&self, track_id: u32, vehicle_id: u32, page: u32) -> String {
        render_page_url(&self.datasource_url, track_id, vehicle_id, page)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pair_timeout(&self) -> Duration {
        Duration::from_secs(self.pair_timeout_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// `None` when every discovered page should be fetched
    pub fn page_limit(&self) -> Option<u32> {
        (self.max_pages_per_pair > 0).then_some(self.max_pages_per_pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.max_concurrent_pairs, 5);
        assert_eq!(config.low_update_threshold, 5);
        assert!(config.validate().is_ok());
        assert_eq!(config.page_limit(), None);
    }

    #[test]
    fn test_durations() {
        let config = SyncConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.pair_timeout(), Duration::from_secs(120));
        assert_eq!(config.cycle_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_page_url() {
        let config = SyncConfig {
            datasource_url: "https://example.test/lb?track={track_id}&car={vehicle_id}&page={page}".to_string(),
            ..SyncConfig::default()
        };
        assert_eq!(config.page_url(3, 42, 2), "https://example.test/lb?track=3&car=42&page=2");
    }

    #[test]
    fn test_rejects_inverted_tiers() {
        let config = SyncConfig {
            high_update_interval_hours: 72,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig { max_concurrent_pages: 0, ..SyncConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_str() {
        let config = SyncConfig::from_toml_str(
            r#"
            [sync]
            max_concurrent_pairs = 8
            max_pages_per_pair = 3
            low_update_threshold = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_pairs, 8);
        assert_eq!(config.page_limit(), Some(3));
        assert_eq!(config.low_update_threshold, 10);
        assert_eq!(config.request_timeout_secs, 15);
    }

    #[test]
    fn test_missing_section_uses_defaults() {
        assert_eq!(SyncConfig::from_toml_str("").unwrap(), SyncConfig::default());
    }
}
