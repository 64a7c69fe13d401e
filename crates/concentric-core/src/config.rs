//! Propagation configuration
//!
//! Provided once at session creation and fixed for the session's lifetime.

use std::time::Duration;

use crate::{ConfigError, MAX_RINGS};

/// Propagation parameters for one session
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PropagationConfig {
    /// Number of rings (1..=64)
    pub total_rings: u16,
    /// Target participants per ring
    pub ring_size: usize,
    /// Rings per minute at a neutral vote score
    pub base_speed: f64,
    /// Aggregate score above which speed is boosted
    pub viral_threshold: f64,
    /// Multiplicative speed reduction per minute since last vote activity
    pub decay_factor: f64,
    /// Lower bound on the decay multiplier
    pub decay_floor: f64,
    /// Number of rings near the placement hash considered on join
    pub placement_window: u16,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        PropagationConfig {
            total_rings: 5,
            ring_size: 8,
            base_speed: 0.2,
            viral_threshold: 0.5,
            decay_factor: 0.9,
            decay_floor: 0.1,
            placement_window: 3,
        }
    }
}

impl PropagationConfig {
    /// Few rings, fast spread - a single breakout room
    pub fn small_room() -> Self {
        PropagationConfig {
            total_rings: 3,
            ring_size: 6,
            base_speed: 0.5,
            viral_threshold: 0.4,
            decay_factor: 0.85,
            decay_floor: 0.2,
            placement_window: 2,
        }
    }

    /// Many rings, slow spread - an auditorium-sized session
    pub fn large_hall() -> Self {
        PropagationConfig {
            total_rings: 16,
            ring_size: 25,
            base_speed: 0.1,
            viral_threshold: 0.6,
            decay_factor: 0.95,
            decay_floor: 0.05,
            placement_window: 4,
        }
    }

    /// Check every parameter; a session must not start with an invalid config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_rings < 1 || self.total_rings > MAX_RINGS {
            return Err(ConfigError::InvalidTotalRings {
                got: self.total_rings,
                max: MAX_RINGS,
            });
        }
        if self.ring_size < 1 {
            return Err(ConfigError::InvalidRingSize);
        }
        if !self.base_speed.is_finite() || self.base_speed <= 0.0 {
            return Err(ConfigError::InvalidBaseSpeed(self.base_speed));
        }
        if !(0.0..1.0).contains(&self.viral_threshold) {
            return Err(ConfigError::InvalidViralThreshold(self.viral_threshold));
        }
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(ConfigError::InvalidDecayFactor(self.decay_factor));
        }
        if !(self.decay_floor > 0.0 && self.decay_floor <= 1.0) {
            return Err(ConfigError::InvalidDecayFloor(self.decay_floor));
        }
        if self.placement_window < 1 {
            return Err(ConfigError::InvalidPlacementWindow);
        }
        Ok(())
    }

    /// Name of the first field that differs from `other`
    pub fn changed_field(&self, other: &PropagationConfig) -> Option<&'static str> {
        if self.total_rings != other.total_rings {
            Some("total_rings")
        } else if self.ring_size != other.ring_size {
            Some("ring_size")
        } else if self.base_speed != other.base_speed {
            Some("base_speed")
        } else if self.viral_threshold != other.viral_threshold {
            Some("viral_threshold")
        } else if self.decay_factor != other.decay_factor {
            Some("decay_factor")
        } else if self.decay_floor != other.decay_floor {
            Some("decay_floor")
        } else if self.placement_window != other.placement_window {
            Some("placement_window")
        } else {
            None
        }
    }

    /// Outermost ring number
    #[inline]
    pub fn last_ring(&self) -> u16 {
        self.total_rings.saturating_sub(1)
    }

    /// Slowest possible propagation speed in rings per minute
    #[inline]
    pub fn min_speed(&self) -> f64 {
        self.base_speed * self.decay_floor
    }

    /// Upper bound on the time a message seeded at ring 0 needs to reach
    /// the outermost ring with no vote activity at all
    pub fn max_time_to_terminal(&self) -> Duration {
        let minutes = self.last_ring() as f64 / self.min_speed();
        Duration::from_secs_f64(minutes * 60.0)
    }
}
