use std::{collections::BTreeMap, path::Path};

use itertools::Itertools;
use serde::Serialize;

use crate::dataset::historical_mean_driving_seconds;
use crate::env::FireDispatchEnv;
use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::simulator::{DispatchFailure, DispatchRecord};

const PROGRESS_INTERVAL: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub policy: String,
    pub steps: u64,
    pub incidents: usize,
    pub dispatched_incidents: usize,
    pub failed_incidents: usize,
    pub total_reward: f64,
    pub mean_reward: f64,
    pub mean_response_time: Option<f64>,
    pub median_response_time: Option<f64>,
    pub p90_response_time: Option<f64>,
    pub max_response_time: Option<f64>,
    /// Mean driving time of the real dispatches, for comparison.
    pub historical_mean_driving_seconds: Option<f64>,
    pub dispatches_per_station: BTreeMap<String, usize>,
}

/// Linearly interpolated percentile of an ascending slice.
fn percentile(sorted: &[f64], fraction: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let position = fraction * last as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64))
}

/// Plays one full episode with `policy`, until the incidents run out or the
/// environment reports done.
pub fn evaluate(env: &mut FireDispatchEnv, policy: &mut dyn Policy) -> EvaluationSummary {
    env.reset();
    let incidents = env.sim.pending_events.len();
    log::info!("Evaluating policy {} on {incidents} incidents", policy.name());

    let mut steps = 0;
    let mut total_reward = 0.0;
    let mut failed_incidents = 0;

    while env.pending_incident().is_some() {
        let ranks = policy.act(env);
        let result = env.step(&ranks);

        steps += 1;
        total_reward += result.reward;
        if result.info.outcome.error == Some(DispatchFailure::NoEnginesDispatched) {
            failed_incidents += 1;
        }
        if steps % PROGRESS_INTERVAL == 0 {
            log::info!("{steps} steps, {} incidents left", result.info.pending_events);
        }
        if result.done {
            break;
        }
    }

    let response_times: Vec<f64> = env
        .sim
        .response_times
        .iter()
        .copied()
        .sorted_by(f64::total_cmp)
        .collect();
    let mean_response_time = (!response_times.is_empty())
        .then(|| response_times.iter().sum::<f64>() / response_times.len() as f64);

    let dispatches_per_station = env
        .sim
        .dispatch_history
        .iter()
        .filter_map(|record| record.station.clone())
        .counts()
        .into_iter()
        .collect();

    EvaluationSummary {
        policy: policy.name().to_owned(),
        steps,
        incidents,
        dispatched_incidents: env.sim.finished_events.len(),
        failed_incidents,
        total_reward,
        mean_reward: if steps == 0 { 0.0 } else { total_reward / steps as f64 },
        mean_response_time,
        median_response_time: percentile(&response_times, 0.5),
        p90_response_time: percentile(&response_times, 0.9),
        max_response_time: response_times.last().copied(),
        historical_mean_driving_seconds: historical_mean_driving_seconds(&env.sim.incident_rows),
        dispatches_per_station,
    }
}

pub fn write_history(path: &Path, history: &[DispatchRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in history {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
