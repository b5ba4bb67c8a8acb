//! Probabilistic record sampling

use logvault_core::{LogRecord, SamplingPolicy};
use rand::Rng;

/// Applies a [`SamplingPolicy`] to individual records
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    policy: SamplingPolicy,
}

impl Sampler {
    pub fn new(policy: SamplingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SamplingPolicy {
        &self.policy
    }

    /// Decide with the thread-local generator
    pub fn should_keep(&self, record: &LogRecord) -> bool {
        self.should_keep_with(record, &mut rand::rng())
    }

    /// Decide with a caller-supplied generator
    pub fn should_keep_with<R: Rng + ?Sized>(&self, record: &LogRecord, rng: &mut R) -> bool {
        let rate = self.policy.rate_for(record);
        if rate >= 1.0 {
            return true;
        }
        if rate <= 0.0 {
            return false;
        }
        rng.random::<f64>() < rate
    }
}
