use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use anyhow::Result;

/// How routes learned on an interface are advertised back out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SplitHorizon {
    NoSplitHorizon,
    #[default]
    SplitHorizon,
    PoisonReverse,
}

/// Which table `print_routing_table` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PrintingOption {
    #[default]
    DontPrint,
    MainRoutingTable,
    NeighborTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    #[serde(with = "secs")]
    pub keep_alive_interval: Duration,
    #[serde(with = "secs")]
    pub neighbor_timeout_delay: Duration,
    #[serde(with = "secs")]
    pub garbage_collection_delay: Duration,
    #[serde(with = "secs")]
    pub startup_delay: Duration,
    pub split_horizon: SplitHorizon,
    #[serde(with = "secs")]
    pub route_timeout_delay: Duration,
    #[serde(with = "secs")]
    pub min_triggered_cooldown: Duration,
    #[serde(with = "secs")]
    pub max_triggered_cooldown: Duration,
    #[serde(with = "secs")]
    pub periodic_update_interval: Duration,
    pub printing: PrintingOption,
    /// Fixed RNG seed; entropy is used when absent.
    pub seed: Option<u64>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(30),
            neighbor_timeout_delay: Duration::from_secs(60),
            garbage_collection_delay: Duration::from_secs(10),
            startup_delay: Duration::from_secs(1),
            split_horizon: SplitHorizon::SplitHorizon,
            route_timeout_delay: Duration::from_secs(180),
            min_triggered_cooldown: Duration::from_secs(1),
            max_triggered_cooldown: Duration::from_secs(5),
            periodic_update_interval: Duration::from_secs(30),
            printing: PrintingOption::DontPrint,
            seed: None,
        }
    }
}

impl ProtocolConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ProtocolConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_triggered_cooldown > self.max_triggered_cooldown {
            anyhow::bail!(
                "min_triggered_cooldown ({:?}) exceeds max_triggered_cooldown ({:?})",
                self.min_triggered_cooldown,
                self.max_triggered_cooldown
            );
        }
        if self.periodic_update_interval.is_zero() {
            anyhow::bail!("periodic_update_interval must be positive");
        }
        Ok(())
    }
}

// Durations travel as (fractional) seconds in config files
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
