//! Fixed-length observation vector handed to dispatch agents.
//!
//! Layout, all features in `[0, 1]`:
//! - next incident: normalised x, y, risk one-hot, waiting time
//! - `obs_engine_count` engine slots of eight features each
//! - time of day and episode progress
//!
//! The vector is zero-padded or truncated to `obs_dim`.

use crate::config::{ObservationConfig, DEFAULT_RISK_LABELS};
use crate::simulator::Simulator;
use crate::travel_times::UNREACHABLE_SECONDS;

const WAIT_SCALE_SECONDS: f64 = 300.0;
const USAGE_SCALE: f64 = 10.0;
const REMAINING_SCALE_SECONDS: f64 = 600.0;
const SECONDS_PER_DAY: i64 = 86_400;
const ENGINE_FEATURES: usize = 8;

fn one_hot(index: usize, length: usize) -> Vec<f64> {
    let mut vec = vec![0.0; length];
    if index < length {
        vec[index] = 1.0;
    }
    vec
}

pub fn observe(sim: &Simulator, config: &ObservationConfig) -> Vec<f32> {
    let mut obs: Vec<f64> = Vec::with_capacity(config.obs_dim);
    let event = sim.pending_events.front();

    match event {
        Some(event) => {
            let (x, y) = event.graph_node;
            obs.push(x / config.map_width);
            obs.push(y / config.map_height);

            let risk_map = config.risk_map();
            let risk_index = risk_map
                .get(&event.risk_level.to_lowercase())
                .copied()
                .unwrap_or(risk_map.len().saturating_sub(1));
            obs.extend(one_hot(risk_index, risk_map.len()));

            let wait = (sim.time - event.timestamp) as f64 / WAIT_SCALE_SECONDS;
            obs.push(wait.clamp(0.0, 1.0));
        }
        None => {
            obs.extend([0.0, 0.0]);
            obs.extend(vec![0.0; DEFAULT_RISK_LABELS.len()]);
            obs.push(0.0);
        }
    }

    let slots = config.obs_engine_count;
    let sorted_ids = sim.sorted_available_engines();

    for slot in 0..slots {
        let engine = sorted_ids
            .get(slot)
            .and_then(|&id| sim.engines.get(id))
            .or_else(|| sim.engines.get(slot));

        let Some(engine) = engine else {
            obs.extend([0.0; ENGINE_FEATURES]);
            continue;
        };

        let travel_time = event
            .and_then(|event| sim.travel_time(event, engine.id))
            .unwrap_or(UNREACHABLE_SECONDS);
        let remaining = if engine.is_available() {
            0.0
        } else {
            (engine.remaining_time / REMAINING_SCALE_SECONDS).clamp(0.0, 1.0)
        };

        obs.extend(one_hot(engine.status.index(), 3));
        obs.extend([
            travel_time.min(UNREACHABLE_SECONDS) / UNREACHABLE_SECONDS,
            slot as f64 / slots as f64,
            (engine.dispatch_count as f64 / USAGE_SCALE).clamp(0.0, 1.0),
            remaining,
            engine.id as f64 / config.max_engines as f64,
        ]);
    }

    obs.push((sim.time.rem_euclid(SECONDS_PER_DAY)) as f64 / SECONDS_PER_DAY as f64);
    obs.push(sim.step_count as f64 / sim.config.max_steps as f64);

    obs.resize(config.obs_dim, 0.0);
    obs.into_iter().map(|value| value as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::simulator::tests::fixture;

    fn simulator() -> Simulator {
        Simulator::new(SimulationConfig::default(), fixture())
    }

    #[test]
    fn has_configured_length() {
        let sim = simulator();
        let config = ObservationConfig::default();
        assert_eq!(observe(&sim, &config).len(), 96);

        let short = ObservationConfig {
            obs_dim: 4,
            ..Default::default()
        };
        assert_eq!(observe(&sim, &short).len(), 4);
    }

    #[test]
    fn encodes_next_incident() {
        let sim = simulator();
        let obs = observe(&sim, &ObservationConfig::default());

        assert_eq!(obs[0], (1000.0 / 400_000.0) as f32);
        assert_eq!(obs[1], (2000.0 / 400_000.0) as f32);
        // "low risk" is index 2 of five
        assert_eq!(&obs[2..7], &[0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(obs[7], 0.0);
    }

    #[test]
    fn encodes_engine_slots_in_rank_order() {
        let sim = simulator();
        let obs = observe(&sim, &ObservationConfig::default());

        // slot 0: engine 0, available, 60s away
        let slot0 = &obs[8..16];
        assert_eq!(&slot0[..3], &[1.0, 0.0, 0.0]);
        assert_eq!(slot0[3], (60.0 / 3600.0) as f32);
        assert_eq!(slot0[4], 0.0);
        assert_eq!(slot0[7], 0.0);

        // slot 2: engine 2 at Bravo, 90s away
        let slot2 = &obs[24..32];
        assert_eq!(slot2[3], (90.0 / 3600.0) as f32);
        assert_eq!(slot2[4], 0.2f32);
        assert_eq!(slot2[7], (2.0 / 40.0) as f32);

        // slots beyond the fleet are empty
        assert!(obs[32..88].iter().all(|&value| value == 0.0));
    }

    #[test]
    fn busy_engines_fill_remaining_slots() {
        let mut sim = simulator();
        sim.step(&[0]);
        let obs = observe(&sim, &ObservationConfig::default());

        // two available engines ranked first, engine 2 repeated in slot 2 as fleet fallback
        let slot2 = &obs[24..32];
        assert_eq!(&slot2[..3], &[1.0, 0.0, 0.0]);
        assert_eq!(slot2[7], (2.0 / 40.0) as f32);

        // time features follow the engine slots
        assert_eq!(obs[88], (300.0 / 86_400.0) as f32);
    }

    #[test]
    fn empty_queue_zeros_incident_features() {
        let mut sim = simulator();
        sim.pending_events.clear();
        let obs = observe(&sim, &ObservationConfig::default());

        assert!(obs[..8].iter().all(|&value| value == 0.0));
        // fleet order, unreachable distance
        assert_eq!(obs[8 + 3], 1.0);
    }
}
