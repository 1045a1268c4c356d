//! Streaming health test for the Infinite Noise Multiplier.
//!
//! The multiplier with gain K produces log2(K) bits of entropy per output
//! bit. The checker predicts each bit from the previous `prediction_bits`
//! bits (separate tables for odd and even phases) and counts how many bits
//! of surprise the actual stream carries. A stuck comparator, a dead clock
//! echo, or an entropy estimate that drifts from log2(K) fails the buffer.
//!
//! Every threshold lives in [`HealthConfig`].

use crate::protocol::{DecodedBuffer, NoiseBit};

/// Context counts are halved once either reaches this value.
const MAX_CONTEXT_COUNT: u32 = 1 << 14;

/// Longest history the prediction tables are sized for.
pub const MAX_PREDICTION_BITS: u32 = 20;

/// Health test thresholds.
///
/// The defaults are the constants of the Infinite Noise TRNG design.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthConfig {
    /// History length used to predict the next bit, at most
    /// [`MAX_PREDICTION_BITS`]. Longer histories are clamped.
    pub prediction_bits: u32,
    /// Gain K of the multiplier stage.
    pub design_gain: f64,
    /// Allowed ratio between measured and expected entropy.
    pub accuracy: f64,
    /// Bits to observe before any output is released.
    pub warmup_bits: u64,
    /// Longest tolerated run of identical bits.
    pub max_run: u32,
    /// Minimum fraction of samples that must echo the driven clock.
    pub min_live_fraction: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            prediction_bits: 14,
            design_gain: 1.84,
            accuracy: 1.03,
            warmup_bits: 80_000,
            max_run: 20,
            min_live_fraction: 0.95,
        }
    }
}

impl HealthConfig {
    /// log2(K): entropy per output bit of an ideal multiplier.
    pub fn expected_entropy_per_bit(&self) -> f64 {
        self.design_gain.log2()
    }

    /// Upper bound on the entropy credited to `bits` output bits.
    pub fn entropy_cap(&self, bits: usize) -> u32 {
        (bits as f64 * self.expected_entropy_per_bit() / self.accuracy) as u32
    }
}

/// Why a buffer failed the health test.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum HealthFailure {
    #[error("{run} identical bits in a row (limit {limit})")]
    RunTooLong { run: u32, limit: u32 },

    #[error("only {live} of {samples} samples echoed the clock")]
    DeadSamples { live: usize, samples: usize },

    #[error("estimated {estimate:.3} bits of entropy per bit, expected {expected:.3}")]
    EntropyOutOfRange { estimate: f64, expected: f64 },

    #[error("buffer carried {entropy} bits of entropy, expected at least {expected}")]
    LowEntropy { entropy: u32, expected: u32 },
}

/// Outcome of checking one buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealthVerdict {
    /// Usable. `entropy` is the estimated entropy of the buffer in bits.
    Healthy { entropy: u32 },
    /// Not enough data has been observed yet; the buffer must not be used.
    WarmingUp,
    Unhealthy(HealthFailure),
}

/// Snapshot of the checker's running statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthStats {
    pub total_bits: u64,
    pub total_entropy: u64,
    pub entropy_per_bit: f64,
    pub longest_run: u32,
    pub buffers: u64,
    pub failures: u64,
}

/// Per-session health checker. Stateful across buffers.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    config: HealthConfig,
    expected: f64,
    mask: usize,
    history: usize,
    // Indexed by phase: [even, odd].
    zeros: [Vec<u32>; 2],
    ones: [Vec<u32>; 2],
    probability: f64,
    prev: Option<bool>,
    run: u32,
    longest_run: u32,
    total_bits: u64,
    total_entropy: u64,
    buffers: u64,
    failures: u64,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        let contexts = 1usize << config.prediction_bits.min(MAX_PREDICTION_BITS);
        Self {
            expected: config.expected_entropy_per_bit(),
            mask: contexts - 1,
            history: 0,
            zeros: [vec![0; contexts], vec![0; contexts]],
            ones: [vec![0; contexts], vec![0; contexts]],
            probability: 1.0,
            prev: None,
            run: 0,
            longest_run: 0,
            total_bits: 0,
            total_entropy: 0,
            buffers: 0,
            failures: 0,
            config,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Feed one decoded buffer and classify it.
    pub fn check(&mut self, decoded: &DecodedBuffer) -> HealthVerdict {
        self.buffers += 1;

        let live = decoded.live();
        if live == 0 || decoded.live_fraction() < self.config.min_live_fraction {
            return self.fail(HealthFailure::DeadSamples {
                live,
                samples: decoded.samples,
            });
        }

        let mut entropy = 0u32;
        for &bit in &decoded.bits {
            entropy += self.add_bit(bit);
            if self.run > self.config.max_run {
                let run = self.run;
                // Start the next buffer with a fresh run.
                self.run = 0;
                self.prev = None;
                return self.fail(HealthFailure::RunTooLong {
                    run,
                    limit: self.config.max_run,
                });
            }
        }

        if self.total_bits < self.config.warmup_bits {
            return HealthVerdict::WarmingUp;
        }

        let estimate = self.entropy_per_bit();
        let accuracy = self.config.accuracy;
        if estimate * accuracy < self.expected || estimate / accuracy > self.expected {
            return self.fail(HealthFailure::EntropyOutOfRange {
                estimate,
                expected: self.expected,
            });
        }

        let expected = live as f64 * self.expected;
        if (entropy as f64) * accuracy < expected {
            return self.fail(HealthFailure::LowEntropy {
                entropy,
                expected: expected as u32,
            });
        }

        HealthVerdict::Healthy { entropy }
    }

    /// Cumulative estimated entropy per bit.
    pub fn entropy_per_bit(&self) -> f64 {
        if self.total_bits == 0 {
            return 0.0;
        }
        self.total_entropy as f64 / self.total_bits as f64
    }

    pub fn stats(&self) -> HealthStats {
        HealthStats {
            total_bits: self.total_bits,
            total_entropy: self.total_entropy,
            entropy_per_bit: self.entropy_per_bit(),
            longest_run: self.longest_run,
            buffers: self.buffers,
            failures: self.failures,
        }
    }

    fn fail(&mut self, failure: HealthFailure) -> HealthVerdict {
        self.failures += 1;
        HealthVerdict::Unhealthy(failure)
    }

    /// Update the prediction tables with one bit. Returns the whole bits of
    /// entropy the bit added to the running estimate.
    fn add_bit(&mut self, bit: NoiseBit) -> u32 {
        let phase = bit.odd as usize;
        let ctx = self.history;
        let zeros = self.zeros[phase][ctx];
        let ones = self.ones[phase][ctx];
        let seen = if bit.value { ones } else { zeros };
        if seen != 0 {
            self.probability *= seen as f64 / (zeros + ones) as f64;
        }
        let mut gained = 0;
        while self.probability <= 0.5 {
            self.probability *= 2.0;
            gained += 1;
        }

        let counter = if bit.value {
            &mut self.ones[phase][ctx]
        } else {
            &mut self.zeros[phase][ctx]
        };
        *counter += 1;
        if *counter >= MAX_CONTEXT_COUNT {
            self.zeros[phase][ctx] /= 2;
            self.ones[phase][ctx] /= 2;
        }
        self.history = ((self.history << 1) | bit.value as usize) & self.mask;

        if self.prev == Some(bit.value) {
            self.run += 1;
        } else {
            self.run = 1;
            self.prev = Some(bit.value);
        }
        self.longest_run = self.longest_run.max(self.run);

        self.total_bits += 1;
        self.total_entropy += u64::from(gained);
        gained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BUFLEN;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn permissive() -> HealthConfig {
        HealthConfig {
            prediction_bits: 4,
            warmup_bits: 0,
            accuracy: 2.0,
            max_run: 64,
            ..HealthConfig::default()
        }
    }

    fn buffer_from(values: impl IntoIterator<Item = bool>) -> DecodedBuffer {
        let bits: Vec<NoiseBit> = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| NoiseBit {
                value,
                odd: i & 1 == 1,
            })
            .collect();
        DecodedBuffer {
            bits,
            samples: BUFLEN,
        }
    }

    fn random_buffer(rng: &mut StdRng) -> DecodedBuffer {
        buffer_from((0..BUFLEN).map(|_| rng.random::<bool>()))
    }

    #[test]
    fn default_constants() {
        let cfg = HealthConfig::default();
        assert_eq!(cfg.prediction_bits, 14);
        assert_eq!(cfg.warmup_bits, 80_000);
        assert_eq!(cfg.max_run, 20);
        assert!((cfg.expected_entropy_per_bit() - 0.8797).abs() < 1e-3);
        assert_eq!(cfg.entropy_cap(BUFLEN), 437);
    }

    #[test]
    fn oversized_history_is_clamped() {
        let mut hc = HealthChecker::new(HealthConfig {
            prediction_bits: 64,
            ..permissive()
        });
        assert_eq!(hc.zeros[0].len(), 1 << MAX_PREDICTION_BITS);
        assert_eq!(hc.config().prediction_bits, 64);
        let mut rng = StdRng::seed_from_u64(17);
        hc.check(&random_buffer(&mut rng));
        assert_eq!(hc.stats().total_bits, BUFLEN as u64);
    }

    #[test]
    fn constant_stream_fails_run_check() {
        let mut hc = HealthChecker::new(permissive());
        let verdict = hc.check(&buffer_from(std::iter::repeat(false).take(BUFLEN)));
        assert_eq!(
            verdict,
            HealthVerdict::Unhealthy(HealthFailure::RunTooLong { run: 65, limit: 64 })
        );
        assert_eq!(hc.stats().failures, 1);
    }

    #[test]
    fn dead_buffer_fails() {
        let mut hc = HealthChecker::new(permissive());
        let empty = DecodedBuffer {
            bits: Vec::new(),
            samples: BUFLEN,
        };
        assert_eq!(
            hc.check(&empty),
            HealthVerdict::Unhealthy(HealthFailure::DeadSamples {
                live: 0,
                samples: BUFLEN
            })
        );
    }

    #[test]
    fn mostly_dead_buffer_fails() {
        let mut hc = HealthChecker::new(permissive());
        let mut rng = StdRng::seed_from_u64(3);
        let half = buffer_from((0..BUFLEN / 2).map(|_| rng.random::<bool>()));
        assert!(matches!(
            hc.check(&half),
            HealthVerdict::Unhealthy(HealthFailure::DeadSamples { live: 256, .. })
        ));
    }

    #[test]
    fn warms_up_before_releasing_data() {
        let mut hc = HealthChecker::new(HealthConfig {
            max_run: 64,
            ..HealthConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(hc.check(&random_buffer(&mut rng)), HealthVerdict::WarmingUp);
        assert_eq!(hc.stats().total_bits, BUFLEN as u64);
    }

    #[test]
    fn random_stream_is_healthy_under_loose_bounds() {
        let mut hc = HealthChecker::new(permissive());
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..4 {
            match hc.check(&random_buffer(&mut rng)) {
                HealthVerdict::Healthy { entropy } => assert!(entropy > 0),
                other => panic!("unexpected verdict {other:?}"),
            }
        }
        assert!(hc.entropy_per_bit() > 0.5);
    }

    #[test]
    fn stream_too_random_for_the_multiplier_is_rejected() {
        // Unbiased coin flips carry ~1 bit per bit, well above log2(1.84).
        let mut hc = HealthChecker::new(HealthConfig {
            prediction_bits: 4,
            warmup_bits: 8 * BUFLEN as u64,
            max_run: 64,
            ..HealthConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..7 {
            assert_eq!(hc.check(&random_buffer(&mut rng)), HealthVerdict::WarmingUp);
        }
        assert!(matches!(
            hc.check(&random_buffer(&mut rng)),
            HealthVerdict::Unhealthy(HealthFailure::EntropyOutOfRange { .. })
        ));
    }

    #[test]
    fn recovers_after_run_failure() {
        let mut hc = HealthChecker::new(permissive());
        let mut rng = StdRng::seed_from_u64(13);
        hc.check(&random_buffer(&mut rng));
        let stuck = buffer_from(std::iter::repeat(true).take(BUFLEN));
        assert!(matches!(hc.check(&stuck), HealthVerdict::Unhealthy(_)));
        assert!(matches!(
            hc.check(&random_buffer(&mut rng)),
            HealthVerdict::Healthy { .. }
        ));
        assert!(hc.stats().longest_run > 64);
    }
}
