//! Monte-Carlo rollout reward estimation.
//!
//! A single end-of-sequence discriminator score gives early tokens no
//! usable credit through one scalar, so each prefix gets its own reward:
//! the mean discriminator score over N completions of that prefix sampled
//! from the *current* generator policy. All N completions of a batch run
//! as one `[batch·N, len]` forward; generator parameters are not touched
//! between rollouts of one step.

use rand::rngs::StdRng;

use crate::data::SequenceBatch;
use crate::error::Result;
use crate::model::{Discriminator, Generator, SampledSequences};

/// Anything that can score full sequences with a realness probability in
/// `[0, 1]`. The discriminator is the production source; tests substitute
/// synthetic ones.
pub trait RewardSource {
    /// One score per sequence in the batch.
    fn score_sequences(&self, batch: &SequenceBatch) -> Result<Vec<f32>>;
}

impl RewardSource for Discriminator {
    fn score_sequences(&self, batch: &SequenceBatch) -> Result<Vec<f32>> {
        self.score(batch)
    }
}

/// Per-step reward estimator (the SeqGAN credit-assignment scheme).
pub struct RolloutRewarder {
    /// Monte-Carlo completions per prefix. 1 degenerates to a single
    /// completion's score; larger values cut estimator variance at
    /// linear cost.
    pub num_rollouts: usize,
    /// Rewards are clamped into `[eps, 1-eps]` so downstream log-domain
    /// math cannot hit infinities at fully confident discriminator output.
    pub clamp_eps: f32,
}

impl RolloutRewarder {
    /// Create an estimator with `num_rollouts ≥ 1`.
    pub fn new(num_rollouts: usize, clamp_eps: f32) -> Self {
        assert!(num_rollouts >= 1, "at least one rollout is required");
        Self {
            num_rollouts,
            clamp_eps,
        }
    }

    /// Per-position rewards for a sampled batch, row-major
    /// `[batch, len]`.
    ///
    /// Position t-1 of a live row gets the mean score of `num_rollouts`
    /// completions of the length-t prefix; the final position of a
    /// full-length row gets the direct score of the whole sequence.
    /// Positions past a row's length (padding after an early end token)
    /// stay at zero, which the policy-gradient loss treats as "no
    /// contribution".
    pub fn rewards(
        &self,
        generator: &Generator,
        source: &dyn RewardSource,
        sampled: &SampledSequences,
        rng: &mut StdRng,
    ) -> Result<Vec<f32>> {
        let b = sampled.batch.batch_size;
        let len = sampled.batch.seq_len;
        let n = self.num_rollouts;
        let mut rewards = vec![0.0f32; b * len];

        for t in 1..=len {
            if t == len {
                // Complete sequences: score directly, no rollout needed.
                let scores = source.score_sequences(&sampled.batch)?;
                for row in 0..b {
                    if sampled.lengths[row] >= t {
                        rewards[row * len + t - 1] = self.clamp(scores[row]);
                    }
                }
            } else {
                let prefix = sampled.batch.prefix(t).repeat_rows(n);
                let completed = generator.complete(&prefix, rng)?;
                let scores = source.score_sequences(&completed)?;
                for row in 0..b {
                    if sampled.lengths[row] < t {
                        continue;
                    }
                    let mean: f32 =
                        scores[row * n..(row + 1) * n].iter().sum::<f32>() / n as f32;
                    rewards[row * len + t - 1] = self.clamp(mean);
                }
            }
        }
        Ok(rewards)
    }

    fn clamp(&self, reward: f32) -> f32 {
        reward.clamp(self.clamp_eps, 1.0 - self.clamp_eps)
    }
}

/// Running mean used as the policy-gradient baseline. Subtracting it does
/// not change the estimator's expectation, only its variance.
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    mean: f64,
    count: u64,
}

impl RunningMean {
    /// Fold one observation in.
    pub fn update(&mut self, value: f32) {
        self.count += 1;
        self.mean += (f64::from(value) - self.mean) / self.count as f64;
    }

    /// Current mean, or 0 before any observation.
    pub fn value(&self) -> f32 {
        self.mean as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeneratorConfig;
    use rand::SeedableRng;

    fn tiny_generator() -> Generator {
        Generator::with_seed(
            GeneratorConfig {
                vocab_size: 5,
                embed_dim: 4,
                hidden_dim: 6,
                max_len: 4,
                pad_idx: 0,
                start_idx: 1,
                eos_idx: None,
            },
            42,
        )
    }

    /// Deterministic reward with real spread: mean token value / vocab.
    struct TokenMeanReward;

    impl RewardSource for TokenMeanReward {
        fn score_sequences(&self, batch: &SequenceBatch) -> Result<Vec<f32>> {
            Ok((0..batch.batch_size)
                .map(|b| {
                    let row = batch.row(b);
                    row.iter().sum::<u32>() as f32 / (row.len() as f32 * 5.0)
                })
                .collect())
        }
    }

    #[test]
    fn test_reward_shape_and_range() {
        let generator = tiny_generator();
        let rewarder = RolloutRewarder::new(2, 1e-4);
        let mut rng = StdRng::seed_from_u64(7);
        let sampled = generator.sample(3, 4, &mut rng).unwrap();
        let rewards = rewarder
            .rewards(&generator, &TokenMeanReward, &sampled, &mut rng)
            .unwrap();

        assert_eq!(rewards.len(), 12);
        for &r in &rewards {
            assert!((0.0..=1.0).contains(&r));
            assert!(r.is_finite());
        }
    }

    #[test]
    fn test_single_rollout_degenerates_to_one_completion_score() {
        // With N=1 and an identically seeded rng, reward(t=1) must equal
        // the source's score of exactly one completion of the length-1
        // prefix, which is the first rollout the estimator performs.
        let generator = tiny_generator();
        let rewarder = RolloutRewarder::new(1, 1e-4);

        let mut sample_rng = StdRng::seed_from_u64(11);
        let sampled = generator.sample(2, 4, &mut sample_rng).unwrap();

        let mut rng = StdRng::seed_from_u64(99);
        let rewards = rewarder
            .rewards(&generator, &TokenMeanReward, &sampled, &mut rng)
            .unwrap();

        let mut replay_rng = StdRng::seed_from_u64(99);
        let completed = generator
            .complete(&sampled.batch.prefix(1), &mut replay_rng)
            .unwrap();
        let scores = TokenMeanReward.score_sequences(&completed).unwrap();

        for row in 0..2 {
            assert_eq!(rewards[row * 4], scores[row].clamp(1e-4, 1.0 - 1e-4));
        }
    }

    #[test]
    fn test_more_rollouts_reduce_variance() {
        // The estimator's expectation is independent of N, but its spread
        // across seeds shrinks as N grows.
        let generator = tiny_generator();
        let mut sample_rng = StdRng::seed_from_u64(5);
        let sampled = generator.sample(1, 4, &mut sample_rng).unwrap();

        let estimate = |n: usize, seed: u64| -> f32 {
            let rewarder = RolloutRewarder::new(n, 1e-4);
            let mut rng = StdRng::seed_from_u64(seed);
            rewarder
                .rewards(&generator, &TokenMeanReward, &sampled, &mut rng)
                .unwrap()[0]
        };

        let seeds: Vec<u64> = (0..40).collect();
        let singles: Vec<f32> = seeds.iter().map(|&s| estimate(1, s)).collect();
        let averaged: Vec<f32> = seeds.iter().map(|&s| estimate(8, s)).collect();

        let var = |xs: &[f32]| {
            let mean = xs.iter().sum::<f32>() / xs.len() as f32;
            xs.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / xs.len() as f32
        };
        let mean = |xs: &[f32]| xs.iter().sum::<f32>() / xs.len() as f32;

        assert!(
            var(&averaged) < var(&singles),
            "averaging rollouts must not increase variance"
        );
        assert!((mean(&averaged) - mean(&singles)).abs() < 0.2);
    }

    #[test]
    fn test_positions_past_length_get_zero_reward() {
        let mut config = GeneratorConfig {
            vocab_size: 5,
            embed_dim: 4,
            hidden_dim: 6,
            max_len: 4,
            pad_idx: 0,
            start_idx: 1,
            eos_idx: None,
        };
        config.eos_idx = Some(2);
        let generator = Generator::with_seed(config, 42);
        let rewarder = RolloutRewarder::new(2, 1e-4);
        let mut rng = StdRng::seed_from_u64(3);
        let sampled = generator.sample(8, 4, &mut rng).unwrap();
        let rewards = rewarder
            .rewards(&generator, &TokenMeanReward, &sampled, &mut rng)
            .unwrap();

        for row in 0..8 {
            for p in sampled.lengths[row]..4 {
                assert_eq!(rewards[row * 4 + p], 0.0);
            }
            for p in 0..sampled.lengths[row] {
                assert!(rewards[row * 4 + p] > 0.0);
            }
        }
    }

    #[test]
    fn test_clamp_keeps_rewards_off_the_edges() {
        struct Extreme;
        impl RewardSource for Extreme {
            fn score_sequences(&self, batch: &SequenceBatch) -> Result<Vec<f32>> {
                Ok((0..batch.batch_size)
                    .map(|b| if b % 2 == 0 { 0.0 } else { 1.0 })
                    .collect())
            }
        }

        let generator = tiny_generator();
        let rewarder = RolloutRewarder::new(1, 1e-3);
        let mut rng = StdRng::seed_from_u64(1);
        let sampled = generator.sample(2, 4, &mut rng).unwrap();
        let rewards = rewarder
            .rewards(&generator, &Extreme, &sampled, &mut rng)
            .unwrap();

        for &r in &rewards {
            assert!(r >= 1e-3 && r <= 1.0 - 1e-3);
        }
    }

    #[test]
    fn test_running_mean() {
        let mut baseline = RunningMean::default();
        assert_eq!(baseline.value(), 0.0);
        baseline.update(1.0);
        baseline.update(0.0);
        assert!((baseline.value() - 0.5).abs() < 1e-6);
    }
}
