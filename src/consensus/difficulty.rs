//! Difficulty retargeting
//!
//! Adjusts the proof-of-work target from observed block timestamps so that
//! block production tracks the configured spacing. The controller keeps a
//! bounded window of recent timestamps and only reacts when production is
//! off by more than a factor of two in either direction.

use num_bigint::BigUint;
use std::collections::VecDeque;

use crate::constants::{POW_LEADING_ZEROES, RETARGET_INTERVAL, TARGET_BLOCK_SPACING_SECS};

/// The easiest permitted target: 2^256 - 1. Retargeting never moves the
/// target above this or down to zero.
pub fn pow_base_target() -> BigUint {
    (BigUint::from(1u8) << 256u32) - BigUint::from(1u8)
}

/// Default starting target: the base target with the configured number of
/// leading zero bits.
pub fn default_pow_target() -> BigUint {
    pow_base_target() >> POW_LEADING_ZEROES
}

/// Retargeting state machine: the current target plus a bounded history of
/// accepted block timestamps (seconds since the Unix epoch).
#[derive(Debug, Clone)]
pub struct DifficultyController {
    target: BigUint,
    retarget_interval: usize,
    target_spacing_secs: u64,
    timestamps: VecDeque<u64>,
}

impl DifficultyController {
    pub fn new(initial_target: BigUint, retarget_interval: usize, target_spacing_secs: u64) -> Self {
        Self {
            target: initial_target,
            retarget_interval,
            target_spacing_secs,
            timestamps: VecDeque::with_capacity(retarget_interval),
        }
    }

    /// Current proof-of-work target
    pub fn target(&self) -> &BigUint {
        &self.target
    }

    /// Record the timestamp of a newly accepted block, keeping only the
    /// last `retarget_interval` samples.
    pub fn on_block_accepted(&mut self, timestamp: u64) {
        self.timestamps.push_back(timestamp);
        while self.timestamps.len() > self.retarget_interval {
            self.timestamps.pop_front();
        }
    }

    /// Observed average spacing over the retained window, in seconds.
    /// Until the window is full there is no adjustment signal and the
    /// configured spacing is reported.
    pub fn average_spacing(&self) -> f64 {
        if self.timestamps.len() < self.retarget_interval || self.retarget_interval < 2 {
            return self.target_spacing_secs as f64;
        }
        let oldest = *self.timestamps.front().unwrap_or(&0);
        let newest = *self.timestamps.back().unwrap_or(&0);
        newest.saturating_sub(oldest) as f64 / (self.retarget_interval - 1) as f64
    }

    /// Compare observed spacing to the configured spacing and adjust the
    /// target: halve it (harder) when blocks arrive in under half the
    /// desired spacing, double it (easier) when they take more than twice
    /// as long. The target stays within (0, base target].
    pub fn maybe_retarget(&mut self) {
        let factor = self.average_spacing() / self.target_spacing_secs as f64;

        if factor < 0.5 {
            let halved = &self.target >> 1u32;
            if halved > BigUint::from(0u8) {
                self.target = halved;
            }
        } else if factor > 2.0 {
            let doubled = &self.target << 1u32;
            let base = pow_base_target();
            self.target = if doubled > base { base } else { doubled };
        }
    }
}

impl Default for DifficultyController {
    fn default() -> Self {
        Self::new(default_pow_target(), RETARGET_INTERVAL, TARGET_BLOCK_SPACING_SECS)
    }
}
