//! Lossy links between simulated nodes
//!
//! A [`ChaosLink`] decides the fate of every envelope sent over one directed
//! link: dropped, delivered after a delay, or delivered twice. Independent
//! delays per copy mean two envelopes on the same link can overtake each
//! other. All randomness comes from a seeded `StdRng`.

use std::time::Duration;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Longest extra delay a single envelope can pick up
const MAX_JITTER_MS: f64 = 200.0;

/// Shape of the extra per-envelope delay
#[derive(Clone, Debug)]
pub enum JitterDistribution {
    /// Any whole millisecond in `min_ms..max_ms`
    Uniform { min_ms: u32, max_ms: u32 },
    /// Mostly around `scale_ms`, with rare long stalls
    Pareto { scale_ms: f64, shape: f64 },
}

impl JitterDistribution {
    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        let ms = match *self {
            JitterDistribution::Uniform { min_ms, max_ms } if min_ms < max_ms => {
                f64::from(Uniform::new(min_ms, max_ms).sample(rng))
            }
            JitterDistribution::Uniform { min_ms, .. } => f64::from(min_ms),
            JitterDistribution::Pareto { scale_ms, shape } => {
                // Inverse CDF; the open lower bound keeps the divisor non-zero
                let u: f64 = rng.gen_range(f64::EPSILON..1.0);
                scale_ms * u.powf(-1.0 / shape)
            }
        };
        Duration::from_millis(ms.clamp(0.0, MAX_JITTER_MS) as u64)
    }
}

/// How badly a link behaves
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Delay every envelope pays
    pub base_latency: Duration,
    pub jitter: JitterDistribution,
    /// Chance that any one envelope is dropped
    pub loss_rate: f64,
    /// Chance that an envelope starts an outage
    pub burst_loss_prob: f64,
    /// Envelopes dropped after the one that starts an outage (inclusive range)
    pub burst_length: (u32, u32),
    /// Chance that a delivered envelope arrives twice
    pub duplicate_prob: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self::reliable()
    }
}

impl ChaosConfig {
    /// Every envelope arrives once, within a couple of milliseconds
    pub fn reliable() -> Self {
        ChaosConfig {
            base_latency: Duration::ZERO,
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 2,
            },
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            duplicate_prob: 0.0,
        }
    }

    /// Roughly one envelope in four lost, a few doubled, short outages
    pub fn lossy() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(1),
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 10,
            },
            loss_rate: 0.25,
            burst_loss_prob: 0.02,
            burst_length: (2, 4),
            duplicate_prob: 0.05,
        }
    }

    /// Most envelopes lost or doubled, long outages and stalls
    pub fn hostile() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(2),
            jitter: JitterDistribution::Pareto {
                scale_ms: 3.0,
                shape: 1.2,
            },
            loss_rate: 0.4,
            burst_loss_prob: 0.05,
            burst_length: (3, 8),
            duplicate_prob: 0.2,
        }
    }

    /// Nothing gets through
    pub fn partitioned() -> Self {
        ChaosConfig {
            loss_rate: 1.0,
            ..Self::reliable()
        }
    }
}

/// What one link did so far
#[derive(Clone, Debug, Default)]
pub struct ChaosStats {
    pub messages_sent: u64,
    pub messages_lost: u64,
    pub messages_duplicated: u64,
    pub max_latency_ms: u64,
}

impl ChaosStats {
    /// Fraction of envelopes dropped
    pub fn loss_rate(&self) -> f64 {
        match self.messages_sent {
            0 => 0.0,
            sent => self.messages_lost as f64 / sent as f64,
        }
    }
}

/// One directed link between two nodes
#[derive(Debug)]
pub struct ChaosLink {
    config: ChaosConfig,
    rng: StdRng,
    /// Envelopes still to drop in the current outage
    outage_left: u32,
    stats: ChaosStats,
}

impl ChaosLink {
    pub fn new(config: ChaosConfig, seed: u64) -> Self {
        ChaosLink {
            config,
            rng: StdRng::seed_from_u64(seed),
            outage_left: 0,
            stats: ChaosStats::default(),
        }
    }

    /// Decide the fate of one envelope.
    ///
    /// Returns one delay per copy to deliver; empty means lost.
    pub fn plan(&mut self) -> Vec<Duration> {
        self.stats.messages_sent += 1;

        if self.in_outage() || self.rng.gen_bool(self.config.loss_rate.clamp(0.0, 1.0)) {
            self.stats.messages_lost += 1;
            return Vec::new();
        }

        let copies = if self.rng.gen_bool(self.config.duplicate_prob.clamp(0.0, 1.0)) {
            self.stats.messages_duplicated += 1;
            2
        } else {
            1
        };

        (0..copies).map(|_| self.delay()).collect()
    }

    fn delay(&mut self) -> Duration {
        let delay = self.config.base_latency + self.config.jitter.sample(&mut self.rng);
        self.stats.max_latency_ms = self.stats.max_latency_ms.max(delay.as_millis() as u64);
        delay
    }

    /// True while an outage is swallowing envelopes, including the one
    /// that starts it
    fn in_outage(&mut self) -> bool {
        if let Some(left) = self.outage_left.checked_sub(1) {
            self.outage_left = left;
            return true;
        }

        if !self.rng.gen_bool(self.config.burst_loss_prob.clamp(0.0, 1.0)) {
            return false;
        }

        let (shortest, longest) = self.config.burst_length;
        self.outage_left = self.rng.gen_range(shortest..=longest.max(shortest));
        true
    }

    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliable_link_delivers_everything_once() {
        let mut link = ChaosLink::new(ChaosConfig::reliable(), 12345);
        for _ in 0..1000 {
            assert_eq!(link.plan().len(), 1);
        }
        assert_eq!(link.stats().messages_lost, 0);
        assert!(link.stats().max_latency_ms <= 2);
    }

    #[test]
    fn test_hostile_link_loses_and_duplicates() {
        let mut link = ChaosLink::new(ChaosConfig::hostile(), 12345);
        for _ in 0..1000 {
            link.plan();
        }

        let stats = link.stats();
        assert!(stats.loss_rate() > 0.2);
        assert!(stats.messages_duplicated > 0);
    }

    #[test]
    fn test_partitioned_link_loses_everything() {
        let mut link = ChaosLink::new(ChaosConfig::partitioned(), 1);
        for _ in 0..100 {
            assert!(link.plan().is_empty());
        }
        assert_eq!(link.stats().loss_rate(), 1.0);
    }

    #[test]
    fn test_same_seed_same_fate() {
        let mut a = ChaosLink::new(ChaosConfig::lossy(), 7);
        let mut b = ChaosLink::new(ChaosConfig::lossy(), 7);
        for _ in 0..200 {
            assert_eq!(a.plan(), b.plan());
        }
    }

    #[test]
    fn test_pareto_jitter_is_capped() {
        let mut rng = StdRng::seed_from_u64(42);
        let pareto = JitterDistribution::Pareto {
            scale_ms: 3.0,
            shape: 1.2,
        };
        assert!((0..1000).all(|_| pareto.sample(&mut rng) <= Duration::from_millis(200)));
    }

    #[test]
    fn test_outage_drops_a_run_of_envelopes() {
        let config = ChaosConfig {
            burst_loss_prob: 1.0,
            burst_length: (3, 3),
            ..ChaosConfig::reliable()
        };
        let mut link = ChaosLink::new(config, 9);

        // Starter plus three more, then a fresh outage starts
        assert!((0..8).all(|_| link.plan().is_empty()));
        assert_eq!(link.stats().messages_lost, 8);
    }

    #[test]
    fn test_empty_uniform_range_is_fixed_delay() {
        let mut rng = StdRng::seed_from_u64(1);
        let fixed = JitterDistribution::Uniform {
            min_ms: 5,
            max_ms: 5,
        };
        assert_eq!(fixed.sample(&mut rng), Duration::from_millis(5));
    }
}
