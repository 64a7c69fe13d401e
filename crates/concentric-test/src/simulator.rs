//! Session simulator - seeded workloads against a single scheduler
//!
//! Generates a plausible event stream (joins, leaves, messages, votes,
//! pauses, periodic ticks), feeds it through a `PropagationScheduler` and
//! checks invariants after every step. Some generated events are invalid
//! on purpose; the engine must reject them without corrupting state.

use std::collections::BTreeSet;
use std::time::Duration;

use concentric_core::{
    MessageId, MessageKind, ParticipantId, PropagationChanged, PropagationConfig, SessionEvent,
    SessionId, Timestamp,
};
use concentric_diffusion::{Applied, PropagationScheduler, SessionSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{InvariantChecker, Violation};

/// Workload configuration
#[derive(Clone, Debug)]
pub struct WorkloadConfig {
    /// Distinct participant ids that may join
    pub participant_pool: u64,
    /// Number of generated steps, not counting ticks
    pub steps: usize,
    /// Probability of a join or leave on a step
    pub churn_prob: f64,
    /// Probability of a new message on a step
    pub message_prob: f64,
    /// Probability of pausing (or resuming) on a step
    pub pause_prob: f64,
    /// Probability that a joiner is pinned to a ring
    pub pinned_prob: f64,
    /// Probability of an event the engine must reject
    pub invalid_prob: f64,
    /// Upper bound on simulated time between steps
    pub max_gap: Duration,
    /// Decay tick period in simulated time
    pub tick_every: Duration,
    /// Random seed
    pub seed: u64,
    pub propagation: PropagationConfig,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        WorkloadConfig {
            participant_pool: 24,
            steps: 500,
            churn_prob: 0.1,
            message_prob: 0.2,
            pause_prob: 0.01,
            pinned_prob: 0.0,
            invalid_prob: 0.02,
            max_gap: Duration::from_secs(5),
            tick_every: Duration::from_secs(1),
            seed: 42,
            propagation: PropagationConfig::default(),
        }
    }
}

impl WorkloadConfig {
    /// Small room, short run
    pub fn light() -> Self {
        WorkloadConfig {
            participant_pool: 8,
            steps: 100,
            churn_prob: 0.05,
            message_prob: 0.2,
            pause_prob: 0.0,
            pinned_prob: 0.0,
            invalid_prob: 0.0,
            max_gap: Duration::from_secs(5),
            tick_every: Duration::from_secs(1),
            seed: 42,
            propagation: PropagationConfig::small_room(),
        }
    }

    /// Large hall with heavy churn and voting
    pub fn heavy() -> Self {
        WorkloadConfig {
            participant_pool: 200,
            steps: 5000,
            churn_prob: 0.2,
            message_prob: 0.1,
            pause_prob: 0.005,
            pinned_prob: 0.0,
            invalid_prob: 0.01,
            max_gap: Duration::from_secs(2),
            tick_every: Duration::from_secs(1),
            seed: 42,
            propagation: PropagationConfig::large_hall(),
        }
    }

    /// Pinned participants, frequent pauses and many bad events
    pub fn adversarial() -> Self {
        WorkloadConfig {
            participant_pool: 40,
            steps: 2000,
            churn_prob: 0.3,
            message_prob: 0.15,
            pause_prob: 0.05,
            pinned_prob: 0.2,
            invalid_prob: 0.2,
            max_gap: Duration::from_secs(30),
            tick_every: Duration::from_secs(2),
            seed: 42,
            propagation: PropagationConfig::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// One step of a workload
#[derive(Clone, Debug, PartialEq)]
pub enum WorkloadStep {
    Event(SessionEvent),
    Tick(Timestamp),
}

/// Deterministic workload generator
///
/// Keeps a rough model of the session (who joined, which messages exist,
/// whether it is paused) so most events are valid.
pub struct WorkloadGenerator {
    config: WorkloadConfig,
    session: SessionId,
    rng: StdRng,
    now: Timestamp,
    next_tick: Timestamp,
    joined: BTreeSet<ParticipantId>,
    messages: Vec<MessageId>,
    next_message: u64,
    paused: bool,
}

impl WorkloadGenerator {
    pub fn new(session: SessionId, config: WorkloadConfig) -> Self {
        WorkloadGenerator {
            rng: StdRng::seed_from_u64(config.seed),
            next_tick: Timestamp::ZERO.saturating_add(config.tick_every),
            config,
            session,
            now: Timestamp::ZERO,
            joined: BTreeSet::new(),
            messages: Vec::new(),
            next_message: 1,
            paused: false,
        }
    }

    /// Generate the whole workload, from start to end
    pub fn generate(mut self) -> Vec<WorkloadStep> {
        let session = self.session;
        let mut steps = vec![WorkloadStep::Event(SessionEvent::Started {
            session,
            at: self.now,
        })];

        let opening = (self.config.participant_pool / 2).max(1);
        for id in 0..opening {
            let event = self.join(ParticipantId::new(id));
            steps.push(WorkloadStep::Event(event));
        }

        for _ in 0..self.config.steps {
            self.advance_time(&mut steps);
            let event = self.next_event();
            steps.push(WorkloadStep::Event(event));
        }

        steps.push(WorkloadStep::Event(SessionEvent::Ended {
            session,
            at: self.now,
        }));
        steps
    }

    fn advance_time(&mut self, steps: &mut Vec<WorkloadStep>) {
        let max_gap = self.config.max_gap.as_micros().max(1) as i64;
        let gap = self.rng.gen_range(1..=max_gap);
        self.now = Timestamp::from_micros(self.now.as_micros() + gap);
        while self.next_tick <= self.now {
            steps.push(WorkloadStep::Tick(self.next_tick));
            self.next_tick = self.next_tick.saturating_add(self.config.tick_every);
        }
    }

    fn next_event(&mut self) -> SessionEvent {
        let roll: f64 = self.rng.gen();
        if roll < self.config.invalid_prob {
            return self.invalid_event();
        }

        let roll: f64 = self.rng.gen();
        if roll < self.config.pause_prob {
            return self.toggle_pause();
        }
        if roll < self.config.pause_prob + self.config.churn_prob {
            if let Some(event) = self.churn() {
                return event;
            }
        }
        if roll < self.config.pause_prob + self.config.churn_prob + self.config.message_prob
            || self.messages.is_empty()
        {
            if let Some(event) = self.new_message() {
                return event;
            }
        }
        self.vote().unwrap_or_else(|| self.join_any())
    }

    fn toggle_pause(&mut self) -> SessionEvent {
        self.paused = !self.paused;
        if self.paused {
            SessionEvent::Paused {
                session: self.session,
                at: self.now,
            }
        } else {
            SessionEvent::Resumed {
                session: self.session,
                at: self.now,
            }
        }
    }

    fn join(&mut self, participant: ParticipantId) -> SessionEvent {
        self.joined.insert(participant);
        let pinned_ring = if self.rng.gen::<f64>() < self.config.pinned_prob {
            Some(self.rng.gen_range(0..self.config.propagation.total_rings))
        } else {
            None
        };
        SessionEvent::ParticipantJoined {
            session: self.session,
            participant,
            joined_at: self.now,
            pinned_ring,
        }
    }

    fn join_any(&mut self) -> SessionEvent {
        let id = self.rng.gen_range(0..self.config.participant_pool);
        self.join(ParticipantId::new(id))
    }

    fn churn(&mut self) -> Option<SessionEvent> {
        let leave = !self.joined.is_empty() && self.rng.gen_bool(0.5);
        if leave {
            let participant = self.pick_joined()?;
            self.joined.remove(&participant);
            return Some(SessionEvent::ParticipantLeft {
                session: self.session,
                participant,
                left_at: self.now,
            });
        }

        let absent: Vec<ParticipantId> = (0..self.config.participant_pool)
            .map(ParticipantId::new)
            .filter(|p| !self.joined.contains(p))
            .collect();
        if absent.is_empty() {
            return None;
        }
        let participant = absent[self.rng.gen_range(0..absent.len())];
        Some(self.join(participant))
    }

    fn new_message(&mut self) -> Option<SessionEvent> {
        let author = self.pick_joined()?;
        let message = MessageId::new(self.next_message);
        self.next_message += 1;
        self.messages.push(message);

        let kind = match self.rng.gen_range(0..20) {
            0 => MessageKind::Prober,
            1 => MessageKind::Moderator,
            2 | 3 => MessageKind::Super,
            _ => MessageKind::Normal,
        };
        Some(SessionEvent::MessageCreated {
            session: self.session,
            message,
            author,
            kind,
            created_at: self.now,
        })
    }

    fn vote(&mut self) -> Option<SessionEvent> {
        if self.messages.is_empty() {
            return None;
        }
        let participant = self.pick_joined()?;
        // recent messages draw most of the attention
        let window = self.messages.len().min(8);
        let message = self.messages[self.messages.len() - 1 - self.rng.gen_range(0..window)];
        let intensity = if self.rng.gen_bool(0.8) {
            self.rng.gen_range(0.0..=1.0)
        } else {
            self.rng.gen_range(-1.0..0.0)
        };
        Some(SessionEvent::VoteSubmitted {
            session: self.session,
            message,
            participant,
            intensity,
            voted_at: self.now,
        })
    }

    fn invalid_event(&mut self) -> SessionEvent {
        let stranger = ParticipantId::new(self.config.participant_pool + self.rng.gen_range(1..1000));
        match self.rng.gen_range(0..4) {
            0 => SessionEvent::VoteSubmitted {
                session: self.session,
                message: MessageId::new(self.next_message + 1000),
                participant: stranger,
                intensity: 0.5,
                voted_at: self.now,
            },
            1 => SessionEvent::VoteSubmitted {
                session: self.session,
                message: self.messages.first().copied().unwrap_or(MessageId::new(1)),
                participant: self.pick_joined().unwrap_or(stranger),
                intensity: 2.0,
                voted_at: self.now,
            },
            2 => SessionEvent::MessageCreated {
                session: self.session,
                message: MessageId::new(self.next_message + 1000),
                author: stranger,
                kind: MessageKind::Normal,
                created_at: self.now,
            },
            _ => SessionEvent::Started {
                session: self.session,
                at: self.now,
            },
        }
    }

    fn pick_joined(&mut self) -> Option<ParticipantId> {
        if self.joined.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.joined.len());
        self.joined.iter().nth(index).copied()
    }
}

/// Outcome of one simulated session
#[derive(Debug, Default)]
pub struct SimulationReport {
    pub events_applied: u64,
    pub events_rejected: u64,
    pub ticks: u64,
    pub notifications: Vec<PropagationChanged>,
    pub violations: Vec<Violation>,
    pub snapshot: Option<SessionSnapshot>,
}

impl SimulationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty() && self.snapshot.is_some()
    }
}

/// Drives one scheduler through a generated workload
pub struct SessionSimulator {
    config: WorkloadConfig,
    session: SessionId,
}

impl SessionSimulator {
    pub fn new(config: WorkloadConfig) -> Self {
        SessionSimulator {
            config,
            session: SessionId::new(1),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn workload(&self) -> Vec<WorkloadStep> {
        WorkloadGenerator::new(self.session, self.config.clone()).generate()
    }

    /// Generate the workload and run it
    pub fn run(&self) -> SimulationReport {
        let steps = self.workload();
        self.replay(&steps)
    }

    /// Run a given list of steps against a fresh scheduler
    pub fn replay(&self, steps: &[WorkloadStep]) -> SimulationReport {
        let mut report = SimulationReport::default();
        let mut engine = match PropagationScheduler::with_seed(
            self.session,
            self.config.propagation.clone(),
            self.config.seed,
        ) {
            Ok(engine) => engine,
            Err(err) => {
                tracing::warn!(error = %err, "workload has an invalid propagation config");
                return report;
            }
        };
        let mut checker = InvariantChecker::new();

        for step in steps {
            match step {
                WorkloadStep::Tick(now) => {
                    if let Err(err) = engine.tick(*now) {
                        tracing::debug!(error = %err, "tick deferred");
                    }
                    report.ticks += 1;
                }
                WorkloadStep::Event(event) => match engine.handle(event.clone()) {
                    Ok(Applied::Ended(snapshot)) => {
                        report.events_applied += 1;
                        report.snapshot = Some(*snapshot);
                    }
                    Ok(_) => report.events_applied += 1,
                    Err(_) => report.events_rejected += 1,
                },
            }

            let notifications = engine.drain_notifications();
            checker.observe_notifications(&notifications);
            report.notifications.extend(notifications);
            if !engine.lifecycle().is_ended() {
                checker.observe(&engine);
            }
        }

        tracing::debug!(
            applied = report.events_applied,
            rejected = report.events_rejected,
            ticks = report.ticks,
            checks = checker.checks(),
            "simulation finished"
        );
        report.violations = checker.violations().to_vec();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let a = SessionSimulator::new(WorkloadConfig::light()).workload();
        let b = SessionSimulator::new(WorkloadConfig::light()).workload();
        assert_eq!(a, b);

        let c = SessionSimulator::new(WorkloadConfig::light().with_seed(7)).workload();
        assert_ne!(a, c);
    }

    #[test]
    fn test_workload_shape() {
        let steps = SessionSimulator::new(WorkloadConfig::light()).workload();
        assert!(matches!(
            steps.first(),
            Some(WorkloadStep::Event(SessionEvent::Started { .. }))
        ));
        assert!(matches!(
            steps.last(),
            Some(WorkloadStep::Event(SessionEvent::Ended { .. }))
        ));

        let mut last = Timestamp::ZERO;
        for step in &steps {
            let at = match step {
                WorkloadStep::Tick(at) => *at,
                WorkloadStep::Event(event) => event.timestamp(),
            };
            assert!(at >= last);
            last = at;
        }
    }

    #[test]
    fn test_light_run_is_clean() {
        let report = SessionSimulator::new(WorkloadConfig::light()).run();
        assert!(report.is_valid(), "{:?}", report.violations);
        assert_eq!(report.events_rejected, 0);
        assert!(report.ticks > 0);
        assert!(!report.notifications.is_empty());
    }

    #[test]
    fn test_adversarial_rejections_leave_state_sound() {
        let report = SessionSimulator::new(WorkloadConfig::adversarial()).run();
        assert!(report.is_valid(), "{:?}", report.violations);
        assert!(report.events_rejected > 0);
    }
}
