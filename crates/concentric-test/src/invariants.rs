//! Invariant checker
//!
//! Observes a scheduler after every step and records anything that breaks
//! the engine's guarantees:
//! - Monotonic propagation: rings never decrease, reach never shrinks
//! - Reach shape per message kind
//! - Ring balance while no participant is pinned
//! - Visibility matches ring membership and reach

use std::collections::{BTreeSet, HashMap};

use concentric_core::{MessageId, MessageKind, ParticipantId, PropagationChanged, Ring, RingSet};
use concentric_diffusion::PropagationScheduler;

/// A broken guarantee
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    RingDecreased {
        message: MessageId,
        from: Ring,
        to: Ring,
    },
    ReachShrank {
        message: MessageId,
        before: RingSet,
        after: RingSet,
    },
    ReachShape {
        message: MessageId,
        kind: MessageKind,
        reach: RingSet,
    },
    RingOutOfRange {
        message: MessageId,
        ring: Ring,
    },
    Imbalanced {
        populations: Vec<usize>,
    },
    VisibilityMismatch {
        participant: ParticipantId,
        missing: Vec<MessageId>,
        unexpected: Vec<MessageId>,
    },
    /// A later notification reported less reach than an earlier one
    NotificationRegressed {
        message: MessageId,
        before: RingSet,
        after: RingSet,
    },
}

/// Tracks what it saw last so it can detect regressions
#[derive(Debug, Default)]
pub struct InvariantChecker {
    seen: HashMap<MessageId, (Ring, RingSet)>,
    notified: HashMap<MessageId, RingSet>,
    violations: Vec<Violation>,
    checks: u64,
}

impl InvariantChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every invariant against the current scheduler state
    pub fn observe(&mut self, engine: &PropagationScheduler) {
        self.checks += 1;
        let config = engine.config();
        let last = config.last_ring();

        for (message, state) in engine.messages() {
            if state.current_ring > last {
                self.violations.push(Violation::RingOutOfRange {
                    message: message.id,
                    ring: state.current_ring,
                });
            }

            let expected = match message.kind {
                MessageKind::Prober => RingSet::full(config.total_rings),
                MessageKind::Moderator => RingSet::single(message.origin_ring),
                MessageKind::Normal | MessageKind::Super => RingSet::prefix(state.current_ring),
            };
            if state.reach != expected {
                self.violations.push(Violation::ReachShape {
                    message: message.id,
                    kind: message.kind,
                    reach: state.reach,
                });
            }

            if let Some(&(ring, reach)) = self.seen.get(&message.id) {
                if state.current_ring < ring {
                    self.violations.push(Violation::RingDecreased {
                        message: message.id,
                        from: ring,
                        to: state.current_ring,
                    });
                }
                if !state.reach.is_superset(reach) {
                    self.violations.push(Violation::ReachShrank {
                        message: message.id,
                        before: reach,
                        after: state.reach,
                    });
                }
            }
            self.seen.insert(message.id, (state.current_ring, state.reach));
        }

        let assignment = engine.assignment();
        let any_pinned = assignment.participants().any(|p| p.pinned);
        if !any_pinned && assignment.spread() > 1 {
            self.violations.push(Violation::Imbalanced {
                populations: assignment.populations(),
            });
        }

        let index = engine.visibility();
        let index = index.read();
        for participant in assignment.participants() {
            let expected: BTreeSet<MessageId> = engine
                .messages()
                .filter(|(_, state)| state.reach.contains(participant.ring))
                .map(|(message, _)| message.id)
                .collect();
            let actual = index.visible_messages(participant.id).unwrap_or_default();
            if actual != expected {
                self.violations.push(Violation::VisibilityMismatch {
                    participant: participant.id,
                    missing: expected.difference(&actual).copied().collect(),
                    unexpected: actual.difference(&expected).copied().collect(),
                });
            }
        }
    }

    /// Check that notifications for each message only ever widen reach
    pub fn observe_notifications(&mut self, notifications: &[PropagationChanged]) {
        for n in notifications {
            let before = self.notified.insert(n.message, n.reach).unwrap_or(RingSet::EMPTY);
            if !n.reach.is_superset(before) {
                self.violations.push(Violation::NotificationRegressed {
                    message: n.message,
                    before,
                    after: n.reach,
                });
            }
        }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of observations made
    pub fn checks(&self) -> u64 {
        self.checks
    }
}
