use std::{collections::HashMap, fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Risk labels in observation order, lower-cased.
pub const DEFAULT_RISK_LABELS: [&str; 5] = [
    "false alarms",
    "secondary fires that attract a 20 minute-response time",
    "low risk",
    "medium risk",
    "high risk",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub simulation: SimulationConfig,
    pub observation: ObservationConfig,
    pub dispatch: DispatchConfig,
    pub data: DataPaths,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub cooldown_seconds: f64,
    pub max_steps: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: crate::data::DEFAULT_COOLDOWN_SECONDS,
            max_steps: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    pub obs_dim: usize,
    pub obs_engine_count: usize,
    pub max_engines: usize,
    pub map_width: f64,
    pub map_height: f64,
    /// Lower-cased risk label to one-hot index. Defaults to [`DEFAULT_RISK_LABELS`].
    pub risk_map: Option<HashMap<String, usize>>,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            obs_dim: 96,
            obs_engine_count: 10,
            max_engines: 40,
            map_width: 400_000.0,
            map_height: 400_000.0,
            risk_map: None,
        }
    }
}

impl ObservationConfig {
    pub fn risk_map(&self) -> HashMap<String, usize> {
        self.risk_map.clone().unwrap_or_else(default_risk_map)
    }
}

pub fn default_risk_map() -> HashMap<String, usize> {
    DEFAULT_RISK_LABELS
        .iter()
        .enumerate()
        .map(|(index, label)| (label.to_string(), index))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_dispatch_per_event: usize,
    pub fallback_on_invalid: bool,
    /// Size of the discrete action space of the ranked wrapper.
    pub max_actions: usize,
    /// Candidates considered by the continuous wrapper.
    pub max_candidates: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_dispatch_per_event: 4,
            fallback_on_invalid: true,
            max_actions: 20,
            max_candidates: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    /// `drv_time_osrm_renamed.csv`
    pub travel_times: Option<PathBuf>,
    /// `real_with_dispatch_info.csv`
    pub incidents: Option<PathBuf>,
    pub station_xy: Option<PathBuf>,
    /// `Station_engine_counts.csv`
    pub engine_counts: Option<PathBuf>,
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = SimConfig::from_toml("").unwrap();

        assert_eq!(config.simulation.cooldown_seconds, 180.0);
        assert_eq!(config.simulation.max_steps, 100_000);
        assert_eq!(config.observation.obs_dim, 96);
        assert_eq!(config.dispatch.max_dispatch_per_event, 4);
        assert!(config.dispatch.fallback_on_invalid);
        assert_eq!(config.observation.risk_map().len(), 5);
        assert_eq!(config.observation.risk_map()["high risk"], 4);
    }

    #[test]
    fn partial_sections_override_fields() {
        let config = SimConfig::from_toml(
            r#"
            [simulation]
            max_steps = 50

            [observation.risk_map]
            "low" = 0
            "high" = 1

            [data]
            travel_times = "data/drv_time_osrm_renamed.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.simulation.max_steps, 50);
        assert_eq!(config.simulation.cooldown_seconds, 180.0);
        assert_eq!(config.observation.risk_map().len(), 2);
        assert_eq!(
            config.data.travel_times,
            Some(PathBuf::from("data/drv_time_osrm_renamed.csv"))
        );
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(matches!(
            SimConfig::from_toml("[simulation]\nmax_steps = \"many\""),
            Err(Error::Toml(_))
        ));
    }
}
