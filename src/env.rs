use serde::Serialize;

use crate::config::SimConfig;
use crate::data::{EngineId, Incident, Time};
use crate::dataset::Dataset;
use crate::observation::observe;
use crate::simulator::{DispatchFailure, DispatchOutcome, Simulator, FAILED_DISPATCH_REWARD};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Space {
    Discrete(usize),
    MultiDiscrete(Vec<usize>),
    Box { low: f32, high: f32, shape: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetInfo {
    pub step_count: u64,
    pub pending_events: usize,
    pub message: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepInfo {
    pub step_count: u64,
    pub pending_events: usize,
    pub time: Time,
    pub selected_engine_ids: Vec<EngineId>,
    pub selected_engine_ranks: Vec<usize>,
    pub last_response_time: Option<f64>,
    pub avg_response_time: Option<f64>,
    /// The simulator's own end-of-run flag; `done` only follows the step limit.
    pub terminated: bool,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
    pub wrapped_engine_ids: Option<Vec<EngineId>>,
    pub wrapped_action_idxs: Option<Vec<usize>>,
    pub wrapped_error: Option<DispatchFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub observation: Vec<f32>,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Fire dispatch environment. An action is a list of ranks into the
/// closest-available-first engine list of the next incident; only as many
/// ranks as the incident requires are used.
#[derive(Debug)]
pub struct FireDispatchEnv {
    pub sim: Simulator,
    pub config: SimConfig,
    last_sorted_actions: Vec<EngineId>,
}

impl FireDispatchEnv {
    pub fn new(config: SimConfig, dataset: Dataset) -> Self {
        let mut sim = Simulator::new(config.simulation.clone(), dataset);
        sim.advance_to_next_event();
        let mut env = Self {
            sim,
            config,
            last_sorted_actions: Vec::new(),
        };
        env.last_sorted_actions = env.sorted_available_actions();
        env
    }

    pub fn num_engines(&self) -> usize {
        self.sim.engines.len()
    }

    pub fn action_space(&self) -> Space {
        Space::MultiDiscrete(vec![
            self.num_engines();
            self.config.dispatch.max_dispatch_per_event
        ])
    }

    pub fn observation_space(&self) -> Space {
        Space::Box {
            low: 0.0,
            high: 1.0,
            shape: self.config.observation.obs_dim,
        }
    }

    pub fn reset(&mut self) -> (Vec<f32>, ResetInfo) {
        self.sim.reset();
        self.sim.advance_to_next_event();
        self.last_sorted_actions = self.sorted_available_actions();

        let info = ResetInfo {
            step_count: 0,
            pending_events: self.sim.pending_events.len(),
            message: "Environment reset",
        };
        (self.observation(), info)
    }

    pub fn observation(&self) -> Vec<f32> {
        observe(&self.sim, &self.config.observation)
    }

    pub fn pending_incident(&self) -> Option<&Incident> {
        self.sim.pending_events.front()
    }

    pub fn available_actions(&self) -> Vec<EngineId> {
        self.sim.available_engines()
    }

    pub fn sorted_available_actions(&self) -> Vec<EngineId> {
        self.sim.sorted_available_engines()
    }

    pub fn step(&mut self, ranks: &[usize]) -> StepResult {
        self.sim.advance_to_next_event();
        self.last_sorted_actions = self.sorted_available_actions();

        if self.last_sorted_actions.is_empty() {
            log::warn!("No available engines, skipping event");
            return self.step_with(Vec::new(), Vec::new());
        }

        let dispatch_count = self
            .pending_incident()
            .map_or(1, Incident::required_dispatch_count);
        let ranks: Vec<usize> = ranks.iter().copied().take(dispatch_count).collect();

        let mut selected = Vec::with_capacity(ranks.len());
        for &rank in &ranks {
            match self.last_sorted_actions.get(rank) {
                Some(&engine_id) => selected.push(engine_id),
                None if self.config.dispatch.fallback_on_invalid => {
                    let fallback = self.last_sorted_actions[0];
                    log::warn!("Action index {rank} out of bounds, using fallback engine {fallback}");
                    selected.push(fallback);
                }
                None => {
                    log::warn!("Action index {rank} out of bounds, terminating");
                    return self.rejected(DispatchFailure::InvalidActionIndex);
                }
            }
        }

        self.step_with(selected, ranks)
    }

    /// Steps with explicit engine ids instead of ranks.
    /// The clock is already at the next incident, so ids taken from
    /// [`Self::sorted_available_actions`] are still available.
    pub fn dispatch_engines(&mut self, engine_ids: Vec<EngineId>) -> StepResult {
        self.step_with(engine_ids, Vec::new())
    }

    fn step_with(&mut self, engine_ids: Vec<EngineId>, ranks: Vec<usize>) -> StepResult {
        let (reward, terminated, outcome) = self.sim.step(&engine_ids);
        // observe the next incident at its own call time
        self.sim.advance_to_next_event();
        let done = self.sim.step_count >= self.sim.config.max_steps;

        if outcome.error == Some(DispatchFailure::NoEnginesDispatched) {
            log::warn!("Step {}: no engines dispatched for event", self.sim.step_count);
        }

        let info = StepInfo {
            selected_engine_ids: engine_ids,
            selected_engine_ranks: ranks,
            terminated,
            outcome,
            ..self.base_info()
        };

        StepResult {
            observation: self.observation(),
            reward,
            done,
            info,
        }
    }

    pub(crate) fn rejected(&self, failure: DispatchFailure) -> StepResult {
        let mut info = self.base_info();
        info.outcome.error = Some(failure);
        StepResult {
            observation: self.observation(),
            reward: FAILED_DISPATCH_REWARD,
            done: true,
            info,
        }
    }

    fn base_info(&self) -> StepInfo {
        let response_times = &self.sim.response_times;
        StepInfo {
            step_count: self.sim.step_count,
            pending_events: self.sim.pending_events.len(),
            time: self.sim.time,
            last_response_time: response_times.last().copied(),
            avg_response_time: (!response_times.is_empty())
                .then(|| response_times.iter().sum::<f64>() / response_times.len() as f64),
            ..Default::default()
        }
    }

    pub fn render(&self) {
        self.sim.render();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::tests::fixture;

    fn env() -> FireDispatchEnv {
        FireDispatchEnv::new(SimConfig::default(), fixture())
    }

    #[test]
    fn spaces_follow_fleet_and_config() {
        let env = env();
        assert_eq!(env.action_space(), Space::MultiDiscrete(vec![3; 4]));
        assert_eq!(
            env.observation_space(),
            Space::Box {
                low: 0.0,
                high: 1.0,
                shape: 96
            }
        );
    }

    #[test]
    fn ranks_map_to_closest_engines() {
        let mut env = env();
        env.step(&[0]);

        // incident 101 needs two engines; Bravo (engine 2) is closest
        let result = env.step(&[0, 1, 0]);

        assert_eq!(result.info.selected_engine_ids, vec![2, 1]);
        assert_eq!(result.info.selected_engine_ranks, vec![0, 1]);
        assert_eq!(result.info.outcome.dispatched_engines, vec![2, 1]);
        assert_eq!(result.info.last_response_time, Some(200.0));
        assert_eq!(result.info.avg_response_time, Some((60.0 + 30.0 + 200.0) / 3.0));
        assert!(!result.done);
    }

    #[test]
    fn out_of_range_rank_falls_back_to_best() {
        let mut env = env();
        let result = env.step(&[7]);

        assert_eq!(result.info.selected_engine_ids, vec![0]);
        assert_eq!(result.reward, -3600.0);
    }

    #[test]
    fn out_of_range_rank_without_fallback_ends_episode() {
        let mut config = SimConfig::default();
        config.dispatch.fallback_on_invalid = false;
        let mut env = FireDispatchEnv::new(config, fixture());

        let result = env.step(&[7]);

        assert!(result.done);
        assert_eq!(result.reward, FAILED_DISPATCH_REWARD);
        assert_eq!(
            result.info.outcome.error,
            Some(DispatchFailure::InvalidActionIndex)
        );
        assert_eq!(env.sim.pending_events.len(), 3);
    }

    #[test]
    fn done_only_at_step_limit() {
        let mut config = SimConfig::default();
        config.simulation.max_steps = 4;
        let mut env = FireDispatchEnv::new(config, fixture());

        env.step(&[0]);
        env.step(&[0, 1]);
        let last = env.step(&[0]);
        assert!(last.info.terminated);
        assert!(!last.done);

        // queue is empty, the step still counts
        let extra = env.step(&[0]);
        assert!(extra.done);
        assert_eq!(extra.reward, 0.0);
    }

    #[test]
    fn fleet_returns_before_the_next_incident_is_ranked() {
        let mut env = env();
        env.step(&[0]);
        env.step(&[0, 1]);

        // every engine was busy at t=600 but is back by 3600
        assert_eq!(env.sim.time, 3600);
        assert_eq!(env.sorted_available_actions(), vec![0, 1, 2]);
        let observation = env.observation();
        assert_eq!(observation[7], 0.0);
        assert_eq!(observation[8 + 10 * 8], (3600.0 / 86_400.0) as f32);

        let result = env.step(&[1]);
        assert_eq!(result.info.outcome.dispatched_engines, vec![1]);
        assert_eq!(result.info.outcome.response_times, vec![45.0]);
        assert_eq!(result.info.outcome.error, None);
    }

    #[test]
    fn reset_restores_the_episode() {
        let mut env = env();
        env.step(&[0]);

        let (observation, info) = env.reset();

        assert_eq!(observation.len(), 96);
        assert_eq!(info.pending_events, 3);
        assert_eq!(env.available_actions(), vec![0, 1, 2]);
    }
}
