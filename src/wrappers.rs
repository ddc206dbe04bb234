use itertools::Itertools;
use serde::Serialize;

use crate::data::{EngineId, Incident};
use crate::env::{FireDispatchEnv, Space, StepInfo, StepResult};
use crate::simulator::{DispatchFailure, FAILED_DISPATCH_REWARD};

/// Five-field step view: `terminated` carries the base `done`, `truncated` is never set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GymnasiumStep {
    pub observation: Vec<f32>,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: StepInfo,
}

impl From<StepResult> for GymnasiumStep {
    fn from(result: StepResult) -> Self {
        Self {
            observation: result.observation,
            reward: result.reward,
            terminated: result.done,
            truncated: false,
            info: result.info,
        }
    }
}

fn required_dispatch_count(env: &FireDispatchEnv) -> usize {
    env.pending_incident()
        .map_or(1, Incident::required_dispatch_count)
}

/// Drops the next incident when nothing can be sent and ends the episode.
fn skip_without_vehicles(env: &mut FireDispatchEnv) -> StepResult {
    let mut result = env.dispatch_engines(Vec::new());
    result.reward = FAILED_DISPATCH_REWARD;
    result.done = true;
    result.info.wrapped_error = Some(DispatchFailure::NoAvailableVehicle);
    result
}

fn dispatch_wrapped(
    env: &mut FireDispatchEnv,
    engine_ids: Vec<EngineId>,
    action_idxs: Vec<usize>,
) -> StepResult {
    let mut result = env.dispatch_engines(engine_ids.clone());
    result.info.wrapped_engine_ids = Some(engine_ids);
    result.info.wrapped_action_idxs = Some(action_idxs);
    result
}

/// Discrete action space: each action is the rank of an engine in the
/// current closest-available-first list. Short action lists are repeated
/// until they cover the number of engines the incident requires.
#[derive(Debug)]
pub struct RankedDispatchEnv {
    pub env: FireDispatchEnv,
    pub max_actions: usize,
    pub fallback_on_invalid: bool,
    current_actions: Vec<EngineId>,
}

impl RankedDispatchEnv {
    pub fn new(env: FireDispatchEnv) -> Self {
        let max_actions = env.config.dispatch.max_actions;
        let fallback_on_invalid = env.config.dispatch.fallback_on_invalid;
        Self {
            env,
            max_actions,
            fallback_on_invalid,
            current_actions: Vec::new(),
        }
    }

    pub fn action_space(&self) -> Space {
        Space::Discrete(self.max_actions)
    }

    pub fn observation_space(&self) -> Space {
        self.env.observation_space()
    }

    pub fn reset(&mut self) -> Vec<f32> {
        let (observation, _) = self.env.reset();
        self.update_action_map();
        observation
    }

    fn update_action_map(&mut self) {
        self.env.sim.advance_to_next_event();
        self.current_actions = self.env.sorted_available_actions();
    }

    pub fn step(&mut self, action_idxs: &[usize]) -> StepResult {
        self.update_action_map();

        if self.current_actions.is_empty() {
            return skip_without_vehicles(&mut self.env);
        }

        let dispatch_count = required_dispatch_count(&self.env);
        let action_idxs: Vec<usize> = action_idxs
            .iter()
            .copied()
            .cycle()
            .take(dispatch_count)
            .collect();

        let mut selected = Vec::with_capacity(action_idxs.len());
        for &idx in &action_idxs {
            match self.current_actions.get(idx) {
                Some(&engine_id) => selected.push(engine_id),
                None if self.fallback_on_invalid => selected.push(self.current_actions[0]),
                None => {
                    let mut result = self.env.rejected(DispatchFailure::InvalidActionIndex);
                    result.done = false;
                    return result;
                }
            }
        }

        dispatch_wrapped(&mut self.env, selected, action_idxs)
    }

    pub fn render(&self) {
        self.env.render();
    }
}

/// Continuous action space for actor-critic agents: one score per rank,
/// and the highest scores among the first `max_candidates` engines win.
#[derive(Debug)]
pub struct ContinuousDispatchEnv {
    pub env: FireDispatchEnv,
    pub max_dispatch: usize,
    pub max_candidates: usize,
    current_actions: Vec<EngineId>,
}

impl ContinuousDispatchEnv {
    pub fn new(env: FireDispatchEnv) -> Self {
        let max_dispatch = env.config.dispatch.max_dispatch_per_event;
        let max_candidates = env.config.dispatch.max_candidates;
        Self {
            env,
            max_dispatch,
            max_candidates,
            current_actions: Vec::new(),
        }
    }

    pub fn action_space(&self) -> Space {
        Space::Box {
            low: 0.0,
            high: 1.0,
            shape: self.max_dispatch,
        }
    }

    pub fn observation_space(&self) -> Space {
        self.env.observation_space()
    }

    pub fn reset(&mut self) -> Vec<f32> {
        let (observation, _) = self.env.reset();
        self.update_action_map();
        observation
    }

    fn update_action_map(&mut self) {
        self.env.sim.advance_to_next_event();
        self.current_actions = self.env.sorted_available_actions();
        self.current_actions.truncate(self.max_candidates);
    }

    pub fn step(&mut self, scores: &[f32]) -> StepResult {
        self.update_action_map();

        if self.current_actions.is_empty() {
            return skip_without_vehicles(&mut self.env);
        }

        let dispatch_count = required_dispatch_count(&self.env);

        let mut scores: Vec<f32> = scores.iter().map(|score| score.clamp(0.0, 1.0)).collect();
        scores.resize(self.max_candidates, 0.0);

        // ties go to the higher rank index
        let selected_idxs: Vec<usize> = (0..scores.len())
            .sorted_by(|&a, &b| scores[a].total_cmp(&scores[b]))
            .rev()
            .take(dispatch_count)
            .filter(|&idx| idx < self.current_actions.len())
            .collect();
        let selected_ids = selected_idxs
            .iter()
            .map(|&idx| self.current_actions[idx])
            .collect();

        dispatch_wrapped(&mut self.env, selected_ids, selected_idxs)
    }

    pub fn render(&self) {
        self.env.render();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::simulator::tests::fixture;

    fn base(config: SimConfig) -> FireDispatchEnv {
        FireDispatchEnv::new(config, fixture())
    }

    #[test]
    fn ranked_repeats_single_action_to_required_count() {
        let mut env = RankedDispatchEnv::new(base(SimConfig::default()));
        assert_eq!(env.action_space(), Space::Discrete(20));
        env.reset();
        env.step(&[0]);

        // two engines required, same rank twice: the second pick is busy and skipped
        let result = env.step(&[0]);

        assert_eq!(result.info.wrapped_action_idxs, Some(vec![0, 0]));
        assert_eq!(result.info.wrapped_engine_ids, Some(vec![2, 2]));
        assert_eq!(result.info.outcome.dispatched_engines, vec![2]);
    }

    #[test]
    fn ranked_invalid_index_without_fallback_keeps_episode_alive() {
        let mut config = SimConfig::default();
        config.dispatch.fallback_on_invalid = false;
        let mut env = RankedDispatchEnv::new(base(config));

        let result = env.step(&[12]);

        assert!(!result.done);
        assert_eq!(result.reward, FAILED_DISPATCH_REWARD);
        assert_eq!(
            result.info.outcome.error,
            Some(DispatchFailure::InvalidActionIndex)
        );
    }

    #[test]
    fn ranked_without_vehicles_ends_episode() {
        let mut env = RankedDispatchEnv::new(base(SimConfig::default()));
        env.env.sim.pending_events.clear();

        let result = env.step(&[0]);

        assert!(result.done);
        assert_eq!(result.reward, FAILED_DISPATCH_REWARD);
        assert_eq!(
            result.info.wrapped_error,
            Some(DispatchFailure::NoAvailableVehicle)
        );
    }

    #[test]
    fn continuous_picks_highest_scores() {
        let mut env = ContinuousDispatchEnv::new(base(SimConfig::default()));
        assert_eq!(
            env.action_space(),
            Space::Box {
                low: 0.0,
                high: 1.0,
                shape: 4
            }
        );
        env.reset();
        env.step(&[1.0]);

        // candidates for incident 101 are [2, 1]; rank 1 scores highest
        let result = env.step(&[0.2, 0.9, 0.5]);

        // rank 2 would score second but lies beyond the two candidates
        assert_eq!(result.info.wrapped_action_idxs, Some(vec![1]));
        assert_eq!(result.info.wrapped_engine_ids, Some(vec![1]));
    }

    #[test]
    fn continuous_clips_and_breaks_ties_by_higher_rank() {
        let mut env = ContinuousDispatchEnv::new(base(SimConfig::default()));
        env.reset();

        // low risk: one engine; everything clips to 1.0 except the padding
        let result = env.step(&[3.0, 7.0, 1.5]);

        assert_eq!(result.info.wrapped_action_idxs, Some(vec![2]));
        assert_eq!(result.info.wrapped_engine_ids, Some(vec![2]));
        assert_eq!(result.info.outcome.response_times, vec![90.0]);
    }

    #[test]
    fn ranked_serves_incident_after_fleet_returns() {
        let mut env = RankedDispatchEnv::new(base(SimConfig::default()));
        env.reset();
        env.step(&[0]);
        env.step(&[0, 1]);

        let result = env.step(&[0]);

        assert_eq!(result.info.wrapped_engine_ids, Some(vec![0]));
        assert_eq!(result.info.outcome.response_times, vec![45.0]);
        assert_eq!(result.info.wrapped_error, None);
    }

    #[test]
    fn gymnasium_view_splits_done() {
        let mut env = base(SimConfig::default());
        let step = GymnasiumStep::from(env.step(&[0]));

        assert!(!step.terminated);
        assert!(!step.truncated);
        assert_eq!(step.reward, -3600.0);
    }
}
