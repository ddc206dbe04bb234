use std::{cmp::Reverse, collections::HashMap, fs::File, path::Path};

use itertools::Itertools;

use crate::config::DataPaths;
use crate::data::Node;
use crate::error::{Error, Result};
use crate::records::{IncidentRow, StationEngineCount, StationLocation};
use crate::travel_times::TravelTimes;

/// Every table the simulator consumes.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub incidents: Vec<IncidentRow>,
    pub travel_times: TravelTimes,
    pub station_xy: HashMap<String, Node>,
    /// Engines per station, in table order.
    pub engine_counts: Vec<(String, u32)>,
}

pub fn deserialize_into<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = csv::Reader::from_reader(file)
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(rows)
}

impl Dataset {
    pub fn load(paths: &DataPaths) -> Result<Self> {
        let travel_times_path = paths
            .travel_times
            .as_deref()
            .ok_or(Error::MissingPath { table: "travel time" })?;
        let incidents_path = paths
            .incidents
            .as_deref()
            .ok_or(Error::MissingPath { table: "incident" })?;
        let engine_counts_path = paths
            .engine_counts
            .as_deref()
            .ok_or(Error::MissingPath { table: "engine count" })?;

        log::info!("Processing travel times");
        let travel_times = TravelTimes::from_path(travel_times_path)?;

        log::info!("Processing incidents");
        let incidents = deserialize_into::<IncidentRow>(incidents_path)?;

        log::info!("Processing engine counts");
        let engine_counts = deserialize_into::<StationEngineCount>(engine_counts_path)?
            .into_iter()
            .map(|row| (row.station.trim().to_owned(), row.count))
            .collect();

        let station_xy = match paths.station_xy.as_deref() {
            Some(path) => {
                log::info!("Processing station locations");
                deserialize_into::<StationLocation>(path)?
                    .into_iter()
                    .map(|row| (row.station.trim().to_owned(), (row.easting, row.northing)))
                    .collect()
            }
            None => {
                log::warn!("No station location table configured, engines start at (0, 0)");
                HashMap::new()
            }
        };

        Ok(Self {
            incidents,
            travel_times,
            station_xy,
            engine_counts,
        })
    }

    pub fn engine_total(&self) -> u32 {
        self.engine_counts.iter().map(|(_, count)| count).sum()
    }

    /// Largest stations first; equal counts keep table order.
    pub fn stations_by_engine_count(&self) -> Vec<&(String, u32)> {
        self.engine_counts
            .iter()
            .sorted_by_key(|(_, count)| Reverse(*count))
            .collect()
    }

    pub fn historical_mean_driving_seconds(&self) -> Option<f64> {
        historical_mean_driving_seconds(&self.incidents)
    }
}

/// Mean driving time of the real dispatches, over incidents that record one.
pub fn historical_mean_driving_seconds(incidents: &[IncidentRow]) -> Option<f64> {
    let observed: Vec<f64> = incidents
        .iter()
        .filter_map(|row| row.driving_seconds)
        .collect();
    if observed.is_empty() {
        return None;
    }
    Some(observed.iter().sum::<f64>() / observed.len() as f64)
}
