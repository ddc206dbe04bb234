use rand::{rngs::StdRng, SeedableRng};

use crate::data::Incident;
use crate::env::FireDispatchEnv;

/// Chooses ranks into the closest-available-first engine list.
pub trait Policy {
    fn name(&self) -> &str;
    fn act(&mut self, env: &FireDispatchEnv) -> Vec<usize>;
}

fn required(env: &FireDispatchEnv) -> usize {
    env.pending_incident()
        .map_or(1, Incident::required_dispatch_count)
}

/// Always sends the closest available engines.
#[derive(Debug, Default)]
pub struct NearestAvailable;

impl Policy for NearestAvailable {
    fn name(&self) -> &str {
        "nearest"
    }

    fn act(&mut self, env: &FireDispatchEnv) -> Vec<usize> {
        (0..required(env)).collect()
    }
}

/// Sends distinct engines drawn uniformly from the available ones.
#[derive(Debug)]
pub struct RandomAvailable {
    rng: StdRng,
}

impl RandomAvailable {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomAvailable {
    fn name(&self) -> &str {
        "random"
    }

    fn act(&mut self, env: &FireDispatchEnv) -> Vec<usize> {
        let available = env.sorted_available_actions().len();
        let amount = required(env).min(available);
        rand::seq::index::sample(&mut self.rng, available, amount).into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::simulator::tests::fixture;

    #[test]
    fn nearest_asks_for_top_ranks() {
        let mut env = FireDispatchEnv::new(SimConfig::default(), fixture());
        let mut policy = NearestAvailable;

        assert_eq!(policy.act(&env), vec![0]);
        env.step(&[0]);
        assert_eq!(policy.act(&env), vec![0, 1]);
    }

    #[test]
    fn random_draws_distinct_ranks_reproducibly() {
        let mut env = FireDispatchEnv::new(SimConfig::default(), fixture());
        env.step(&[0]);

        let first = RandomAvailable::new(7).act(&env);
        let second = RandomAvailable::new(7).act(&env);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_ne!(first[0], first[1]);
        assert!(first.iter().all(|&rank| rank < 2));
    }
}
