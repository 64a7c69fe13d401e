//! Propagation clock for a single message
//!
//! INVARIANT: `current_ring` never decreases and reach only grows.
//! The clock returns a new state instead of mutating in place so the caller
//! can commit it against the revision it was computed from.

use concentric_core::{Message, MessageKind, PropagationConfig, Ring, RingSet, Timestamp};

use crate::{progress_between, viral_boost};

/// Propagation state of one message
#[derive(Clone, Debug, PartialEq)]
pub struct PropagationState {
    /// Outermost ring reached so far
    pub current_ring: Ring,
    /// Rings that have received the message
    pub reach: RingSet,
    /// Fractional progress toward the next ring
    pub progress: f64,
    pub last_advance_at: Timestamp,
    pub last_vote_at: Timestamp,
    /// Progress has been accounted up to this time
    pub last_tick_at: Timestamp,
    /// Viral boost at the last tick, in [0, 1]
    pub viral_score: f64,
    /// When each ring first received the message
    pub visible_since: Vec<Option<Timestamp>>,
    /// Outermost ring reached, or propagation disabled for the kind
    pub terminal: bool,
}

impl PropagationState {
    /// Initial state for a freshly created message
    ///
    /// `seed_ring` is where normal and super messages start; prober and
    /// moderator messages ignore it.
    pub fn seed(message: &Message, seed_ring: Ring, config: &PropagationConfig) -> Self {
        let last = config.last_ring();
        let (current_ring, reach, terminal) = match message.kind {
            MessageKind::Prober => (last, RingSet::full(config.total_rings), true),
            MessageKind::Moderator => {
                let ring = message.origin_ring.min(last);
                (ring, RingSet::single(ring), true)
            }
            MessageKind::Normal | MessageKind::Super => {
                let ring = seed_ring.min(last);
                (ring, RingSet::prefix(ring), ring == last)
            }
        };

        let mut visible_since = vec![None; config.total_rings as usize];
        for ring in reach.iter() {
            visible_since[ring as usize] = Some(message.created_at);
        }

        PropagationState {
            current_ring,
            reach,
            progress: 0.0,
            last_advance_at: message.created_at,
            last_vote_at: message.created_at,
            last_tick_at: message.created_at,
            viral_score: 0.0,
            visible_since,
            terminal,
        }
    }

    #[inline]
    pub fn is_visible_in(&self, ring: Ring) -> bool {
        self.reach.contains(ring)
    }

    /// Note vote activity; decay restarts from `at`
    pub fn record_vote_activity(&mut self, at: Timestamp) {
        if at > self.last_vote_at {
            self.last_vote_at = at;
        }
    }

    /// Rebase clock references after a pause from `paused_at` to `resumed_at`
    ///
    /// References taken before the pause move forward by the pause length.
    /// References inside the pause window land on `resumed_at`, so the pause
    /// counts toward neither decay nor advancement.
    pub fn resume_from_pause(&mut self, paused_at: Timestamp, resumed_at: Timestamp) {
        let pause = resumed_at - paused_at;
        let rebase = |t: Timestamp| {
            if t <= paused_at {
                t.saturating_add(pause)
            } else {
                t.max(resumed_at)
            }
        };
        self.last_tick_at = rebase(self.last_tick_at);
        self.last_advance_at = rebase(self.last_advance_at);
        self.last_vote_at = rebase(self.last_vote_at);
    }
}

/// Result of one clock tick
#[derive(Clone, Debug)]
pub struct TickOutcome {
    pub state: PropagationState,
    /// Rings reached by this tick
    pub newly_reached: RingSet,
}

impl TickOutcome {
    #[inline]
    pub fn advanced(&self) -> bool {
        !self.newly_reached.is_empty()
    }
}

/// Propagation clock - turns elapsed time and vote signal into ring advances
#[derive(Clone, Debug)]
pub struct PropagationClock {
    config: PropagationConfig,
}

impl PropagationClock {
    pub fn new(config: PropagationConfig) -> Self {
        PropagationClock { config }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Advance `state` to `now` using the current aggregate score
    ///
    /// No-op for terminal states, for kinds that do not propagate and for
    /// `now` at or before the last tick.
    pub fn tick(
        &self,
        message: &Message,
        state: &PropagationState,
        score: f64,
        now: Timestamp,
    ) -> TickOutcome {
        let mut next = state.clone();
        next.viral_score = viral_boost(score, &self.config);

        if state.terminal || !message.kind.propagates() || now <= state.last_tick_at {
            return TickOutcome {
                state: next,
                newly_reached: RingSet::EMPTY,
            };
        }

        next.progress += progress_between(
            score,
            state.last_vote_at,
            state.last_tick_at,
            now,
            &self.config,
        );
        next.last_tick_at = now;

        let last = self.config.last_ring();
        let mut newly_reached = RingSet::EMPTY;
        while next.progress >= 1.0 && next.current_ring < last {
            next.progress -= 1.0;
            next.current_ring += 1;
            next.reach.insert(next.current_ring);
            next.visible_since[next.current_ring as usize] = Some(now);
            newly_reached.insert(next.current_ring);
        }

        if !newly_reached.is_empty() {
            next.last_advance_at = now;
            tracing::debug!(
                message = %message.id,
                ring = next.current_ring,
                progress = next.progress,
                "message advanced"
            );
        }

        if next.current_ring >= last {
            next.terminal = true;
            next.progress = 0.0;
        }

        TickOutcome {
            state: next,
            newly_reached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concentric_core::{MessageId, ParticipantId};

    fn config() -> PropagationConfig {
        PropagationConfig {
            total_rings: 5,
            base_speed: 0.2,
            viral_threshold: 0.5,
            decay_factor: 1.0,
            decay_floor: 0.1,
            ..Default::default()
        }
    }

    fn message(kind: MessageKind, origin_ring: Ring) -> Message {
        Message {
            id: MessageId::new(1),
            author: ParticipantId::new(1),
            origin_ring,
            kind,
            created_at: Timestamp::ZERO,
        }
    }

    fn minutes(m: f64) -> Timestamp {
        Timestamp::from_minutes_f64(m)
    }

    #[test]
    fn test_seed_by_kind() {
        let config = config();

        let normal = PropagationState::seed(&message(MessageKind::Normal, 2), 2, &config);
        assert_eq!(normal.current_ring, 2);
        assert_eq!(normal.reach, RingSet::prefix(2));
        assert!(!normal.terminal);

        let prober = PropagationState::seed(&message(MessageKind::Prober, 1), 1, &config);
        assert_eq!(prober.reach, RingSet::full(5));
        assert_eq!(prober.current_ring, 4);
        assert!(prober.terminal);

        let moderator = PropagationState::seed(&message(MessageKind::Moderator, 3), 0, &config);
        assert_eq!(moderator.reach, RingSet::single(3));
        assert!(moderator.terminal);
    }

    #[test]
    fn test_scenario_viral_message() {
        let clock = PropagationClock::new(config());
        let msg = message(MessageKind::Normal, 0);
        let state = PropagationState::seed(&msg, 0, clock.config());

        let at_three = clock.tick(&msg, &state, 0.8, minutes(3.0));
        assert!(!at_three.advanced());
        assert!((at_three.state.progress - 0.96).abs() < 1e-9);

        let at_four = clock.tick(&msg, &at_three.state, 0.8, minutes(4.0));
        assert!(at_four.advanced());
        assert_eq!(at_four.state.current_ring, 1);
        assert_eq!(at_four.state.reach, RingSet::prefix(1));
        assert!((at_four.state.progress - 0.28).abs() < 1e-9);
        assert_eq!(at_four.state.last_advance_at, minutes(4.0));
    }

    #[test]
    fn test_fractional_progress_carries_over() {
        let clock = PropagationClock::new(config());
        let msg = message(MessageKind::Normal, 0);
        let mut state = PropagationState::seed(&msg, 0, clock.config());

        // 0.2 rings/minute, ticked every 2 minutes
        for i in 1..=3 {
            state = clock.tick(&msg, &state, 0.0, minutes(i as f64 * 2.0)).state;
        }
        assert_eq!(state.current_ring, 1);
        assert!((state.progress - 0.2).abs() < 1e-9);

        for i in 4..=6 {
            state = clock.tick(&msg, &state, 0.0, minutes(i as f64 * 2.0)).state;
        }
        assert_eq!(state.current_ring, 2);
        assert!((state.progress - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_multiple_advances_in_one_tick_cap_at_last_ring() {
        let clock = PropagationClock::new(config());
        let msg = message(MessageKind::Normal, 0);
        let state = PropagationState::seed(&msg, 0, clock.config());

        let outcome = clock.tick(&msg, &state, 1.0, minutes(600.0));
        assert_eq!(outcome.state.current_ring, 4);
        assert_eq!(outcome.newly_reached.iter().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert!(outcome.state.terminal);

        let again = clock.tick(&msg, &outcome.state, 1.0, minutes(700.0));
        assert!(!again.advanced());
        assert_eq!(again.state.last_tick_at, outcome.state.last_tick_at);
    }

    #[test]
    fn test_moderator_never_moves() {
        let clock = PropagationClock::new(config());
        let msg = message(MessageKind::Moderator, 2);
        let state = PropagationState::seed(&msg, 2, clock.config());

        let outcome = clock.tick(&msg, &state, 1.0, minutes(1000.0));
        assert_eq!(outcome.state.reach, RingSet::single(2));
        assert!(!outcome.advanced());
    }

    #[test]
    fn test_tick_in_the_past_is_noop() {
        let clock = PropagationClock::new(config());
        let msg = message(MessageKind::Normal, 0);
        let state = PropagationState::seed(&msg, 0, clock.config());
        let later = clock.tick(&msg, &state, 0.0, minutes(2.0)).state;

        let replay = clock.tick(&msg, &later, 0.0, minutes(1.0));
        assert_eq!(replay.state.progress, later.progress);
        assert_eq!(replay.state.last_tick_at, later.last_tick_at);
    }

    #[test]
    fn test_resume_moves_references() {
        let config = config();
        let msg = message(MessageKind::Normal, 0);
        let mut state = PropagationState::seed(&msg, 0, &config);
        state.record_vote_activity(minutes(2.0));
        state.resume_from_pause(minutes(5.0), minutes(15.0));
        assert_eq!(state.last_tick_at, minutes(10.0));
        assert_eq!(state.last_advance_at, minutes(10.0));
        assert_eq!(state.last_vote_at, minutes(12.0));
    }

    #[test]
    fn test_resume_clamps_references_inside_pause() {
        let config = config();
        let mut msg = message(MessageKind::Normal, 0);
        msg.created_at = minutes(7.0);
        let mut state = PropagationState::seed(&msg, 0, &config);
        state.resume_from_pause(minutes(5.0), minutes(15.0));
        assert_eq!(state.last_tick_at, minutes(15.0));
    }

    #[test]
    fn test_pause_window_does_not_advance() {
        let clock = PropagationClock::new(config());
        let msg = message(MessageKind::Normal, 0);
        let state = PropagationState::seed(&msg, 0, clock.config());
        let before = clock.tick(&msg, &state, 0.0, minutes(4.0)).state;
        assert!((before.progress - 0.8).abs() < 1e-9);

        let mut paused = before.clone();
        paused.resume_from_pause(minutes(4.0), minutes(14.0));
        let after = clock.tick(&msg, &paused, 0.0, minutes(14.0));
        assert!(!after.advanced());
        assert!((after.state.progress - 0.8).abs() < 1e-9);
        assert_eq!(after.state.current_ring, 0);
    }
}
