//! Effective propagation speed
//!
//! speed(s) = base_speed * (1 + viral_boost) * decay(s)
//!
//! where decay(s) = max(decay_floor, decay_factor ^ (s - last_vote)) and s
//! is measured in minutes. Progress between two ticks is the integral of
//! speed over the interval, computed in closed form so the result does not
//! depend on how often the clock is ticked.

use concentric_core::{PropagationConfig, Timestamp};

/// Boost applied above the viral threshold: 0 at or below it, 1 at score 1
#[inline]
pub fn viral_boost(score: f64, config: &PropagationConfig) -> f64 {
    let headroom = 1.0 - config.viral_threshold;
    if headroom <= 0.0 {
        return 0.0;
    }
    ((score - config.viral_threshold).max(0.0) / headroom).min(1.0)
}

/// Decay multiplier `minutes_idle` minutes after the last vote
#[inline]
pub fn decay_multiplier(minutes_idle: f64, config: &PropagationConfig) -> f64 {
    config
        .decay_factor
        .powf(minutes_idle.max(0.0))
        .max(config.decay_floor)
}

/// Instantaneous speed in rings per minute at time `at`
pub fn effective_speed(
    score: f64,
    last_vote_at: Timestamp,
    at: Timestamp,
    config: &PropagationConfig,
) -> f64 {
    let decay = decay_multiplier(at.minutes_since(last_vote_at), config);
    config.base_speed * (1.0 + viral_boost(score, config)) * decay
}

/// Ring progress accumulated over `[from, to]`
///
/// The interval before `last_vote_at` runs undecayed. After it the
/// multiplier decays exponentially until it meets the floor and stays
/// there.
pub fn progress_between(
    score: f64,
    last_vote_at: Timestamp,
    from: Timestamp,
    to: Timestamp,
    config: &PropagationConfig,
) -> f64 {
    if to <= from {
        return 0.0;
    }

    let start = from.as_minutes_f64();
    let end = to.as_minutes_f64();
    let vote = last_vote_at.as_minutes_f64();

    let undecayed = (end.min(vote) - start).max(0.0);

    let x0 = (start.max(vote) - vote).max(0.0);
    let x1 = (end - vote).max(0.0);
    let decayed = if x1 > x0 {
        decayed_integral(x0, x1, config)
    } else {
        0.0
    };

    config.base_speed * (1.0 + viral_boost(score, config)) * (undecayed + decayed)
}

/// Integral of max(floor, d^x) over [x0, x1], x measured from the last vote
fn decayed_integral(x0: f64, x1: f64, config: &PropagationConfig) -> f64 {
    let d = config.decay_factor;
    let floor = config.decay_floor;

    if d >= 1.0 || floor >= 1.0 {
        // multiplier pinned at 1
        return x1 - x0;
    }

    let ln_d = d.ln();
    let x_floor = floor.ln() / ln_d;

    let mut total = 0.0;
    if x0 < x_floor {
        let b = x1.min(x_floor);
        total += (d.powf(b) - d.powf(x0)) / ln_d;
    }
    if x1 > x_floor {
        total += floor * (x1 - x0.max(x_floor));
    }
    total
}
